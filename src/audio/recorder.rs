//! Takes are captured without allocating on the audio thread. The session side
//! lends a pool of fixed-capacity chunks; the engine fills them from the input
//! and sends them back, and the take is put together here.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use super::frame::StereoFrame;
use super::sample_buffer::SampleBuffer;

const CHUNK_FRAMES: usize = 4096;
const POOL_CHUNKS: usize = 32;
const MAX_TAKE_SECS: usize = 600;

/// What the engine reports while a take is running.
#[derive(Debug)]
pub enum RecordEvent {
    Chunk(Vec<StereoFrame>),
    Finished,
}

/// A finished take, ready to be written out.
#[derive(Clone, Debug)]
pub struct CompletedRecording {
    pub buffer: Arc<SampleBuffer>,
}

/// Both ends of a recording path: the tap goes to the engine, the recorder
/// stays on the session thread.
pub fn channel(sample_rate: u32) -> (Recorder, RecordTap) {
    let (free_tx, free_rx) = crossbeam_channel::bounded(POOL_CHUNKS);
    // every chunk in circulation plus the Finished marker fits, so the audio
    // side never sees a full queue
    let (event_tx, event_rx) = crossbeam_channel::bounded(POOL_CHUNKS + 1);
    for _ in 0..POOL_CHUNKS {
        let _ = free_tx.try_send(Vec::with_capacity(CHUNK_FRAMES));
    }
    let recorder = Recorder {
        events: event_rx,
        free: free_tx,
        take: Vec::new(),
        sample_rate,
    };
    let tap = RecordTap {
        free: free_rx,
        events: event_tx,
        chunk: None,
        armed: false,
        frames: 0,
        max_frames: MAX_TAKE_SECS * sample_rate as usize,
    };
    (recorder, tap)
}

/// Audio-thread end.
pub struct RecordTap {
    free: Receiver<Vec<StereoFrame>>,
    events: Sender<RecordEvent>,
    chunk: Option<Vec<StereoFrame>>,
    armed: bool,
    frames: usize,
    max_frames: usize,
}

impl RecordTap {
    pub fn start(&mut self) {
        self.armed = true;
        self.frames = 0;
    }

    /// Frames that find no free chunk are dropped, as is anything past the
    /// take length limit.
    pub fn write(&mut self, mut input: &[StereoFrame]) {
        if !self.armed {
            return;
        }
        while !input.is_empty() && self.frames < self.max_frames {
            if self.chunk.is_none() {
                match self.free.try_recv() {
                    Ok(chunk) => self.chunk = Some(chunk),
                    Err(_) => return,
                }
            }
            let Some(chunk) = self.chunk.as_mut() else {
                return;
            };
            let room = (chunk.capacity() - chunk.len()).min(self.max_frames - self.frames);
            let n = room.min(input.len());
            chunk.extend_from_slice(&input[..n]);
            self.frames += n;
            input = &input[n..];
            if chunk.len() == chunk.capacity() {
                self.flush();
            }
        }
    }

    pub fn stop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        self.flush();
        let _ = self.events.try_send(RecordEvent::Finished);
    }

    fn flush(&mut self) {
        match self.chunk.take() {
            Some(chunk) if !chunk.is_empty() => {
                let _ = self.events.try_send(RecordEvent::Chunk(chunk));
            }
            other => self.chunk = other,
        }
    }
}

/// Session-thread end.
pub struct Recorder {
    events: Receiver<RecordEvent>,
    free: Sender<Vec<StereoFrame>>,
    take: Vec<StereoFrame>,
    sample_rate: u32,
}

impl Recorder {
    pub fn events(&self) -> &Receiver<RecordEvent> {
        &self.events
    }

    /// Folds one event into the take in progress. Yields the take once the
    /// engine reports it finished, unless nothing was captured.
    pub fn absorb(&mut self, event: RecordEvent) -> Option<CompletedRecording> {
        match event {
            RecordEvent::Chunk(mut chunk) => {
                self.take.extend_from_slice(&chunk);
                chunk.clear();
                let _ = self.free.try_send(chunk);
                None
            }
            RecordEvent::Finished => {
                let data = std::mem::take(&mut self.take);
                if data.is_empty() {
                    log::info!(target: "audio", "take discarded, no input was captured");
                    return None;
                }
                let buffer = Arc::new(SampleBuffer::new(data, self.sample_rate));
                Some(CompletedRecording { buffer })
            }
        }
    }

    /// Absorb everything already queued.
    pub fn drain(&mut self) -> Option<CompletedRecording> {
        let mut done = None;
        while let Ok(event) = self.events.try_recv() {
            done = self.absorb(event).or(done);
        }
        done
    }
}
