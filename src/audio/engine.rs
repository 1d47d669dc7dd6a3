use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crossbeam_channel::Receiver;

use super::convolution::{GuitarChain, GuitarSpec};
use super::frame::StereoFrame;
use super::graph::{EffectGraph, GraphSpec};
use super::recorder::RecordTap;
use super::sample_buffer::SampleBuffer;
use super::voice::{SamplePlayer, SynthVoice};
use crate::audio_api::{AudioCommand, TriggerParams};
use crate::pipeline::track::TrackKind;

const MAX_VOICES: usize = 32; // hard cap so we wont malloc in audio callback
const MAX_PENDING: usize = 1024;
/// Values the audio thread publishes for everyone else to read.
#[derive(Clone, Debug, Default)]
pub struct Meters {
    pub frames: Arc<AtomicU64>,    // audio clock
    pub input_peak: Arc<AtomicU32>, // f32 bits
}

impl Meters {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn input_peak(&self) -> f32 {
        f32::from_bits(self.input_peak.load(Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct Pending {
    frame: u64,
    params: TriggerParams,
}

pub struct Engine {
    sample_rate: u32,
    frame: u64,
    meters: Meters,

    voices: Vec<SynthVoice>,
    pending: Vec<Pending>, // sorted by frame, latest first, so the next due is at the end
    seed: u32,

    graph: EffectGraph,
    strip_bufs: Vec<Vec<StereoFrame>>, // one per TrackKind

    guitar: GuitarChain,
    input_rx: Option<Receiver<Vec<StereoFrame>>>,
    input_fifo: VecDeque<StereoFrame>,
    input_buf: Vec<StereoFrame>,
    record_tap: Option<RecordTap>,
    playback: Option<(Arc<SampleBuffer>, SamplePlayer)>,
}

impl Engine {
    pub fn new(sample_rate: u32, graph: &GraphSpec, guitar: &GuitarSpec, max_block: usize) -> Self {
        Self {
            sample_rate,
            frame: 0,
            meters: Meters::default(),
            voices: Vec::with_capacity(MAX_VOICES),
            pending: Vec::with_capacity(MAX_PENDING),
            seed: 0x9e37_79b9,
            graph: EffectGraph::build(graph, sample_rate as f32, max_block),
            strip_bufs: vec![vec![StereoFrame::zero(); max_block]; TrackKind::COUNT],
            guitar: GuitarChain::new(guitar, sample_rate),
            input_rx: None,
            input_fifo: VecDeque::with_capacity(sample_rate as usize),
            input_buf: vec![StereoFrame::zero(); max_block],
            record_tap: None,
            playback: None,
        }
    }

    pub fn meters(&self) -> Meters {
        self.meters.clone()
    }

    pub fn set_input_rx(&mut self, rx: Receiver<Vec<StereoFrame>>) {
        self.input_rx = Some(rx);
    }

    pub fn set_record_tap(&mut self, tap: RecordTap) {
        self.record_tap = Some(tap);
    }

    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::Trigger(t) => self.schedule(t),
            AudioCommand::CancelScheduled => self.pending.clear(),
            AudioCommand::SetInstrumentGain { instrument, gain_db } => {
                self.graph.set_strip_gain_db(instrument, gain_db)
            }
            AudioCommand::SetMasterGain(gain) => self.graph.set_master_gain(gain),
            AudioCommand::SetReverbMix(mix) => self.guitar.set_mix(mix),
            AudioCommand::StartRecording => {
                if let Some(tap) = self.record_tap.as_mut() {
                    tap.start();
                }
            }
            AudioCommand::StopRecording => {
                if let Some(tap) = self.record_tap.as_mut() {
                    tap.stop();
                }
            }
            AudioCommand::PlayRecording(buffer) => {
                let player = SamplePlayer::new(buffer.sample_rate, self.sample_rate, 1.0);
                self.playback = Some((buffer, player));
            }
        }
    }

    fn schedule(&mut self, t: TriggerParams) {
        let frame = t.at.map_or(0, |at| at.to_frame(self.sample_rate));
        if frame <= self.frame {
            self.start_voices(t);
            return;
        }
        if self.pending.len() >= MAX_PENDING {
            return; // queue full, drop rather than allocate
        }
        let idx = self.pending.partition_point(|p| p.frame > frame);
        self.pending.insert(idx, Pending { frame, params: t });
    }

    fn start_voices(&mut self, t: TriggerParams) {
        for &freq in &t.pitches {
            if self.voices.len() >= MAX_VOICES {
                // steal the quietest
                if let Some(i) = self
                    .voices
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.level().total_cmp(&b.1.level()))
                    .map(|(i, _)| i)
                {
                    self.voices.swap_remove(i);
                }
            }
            self.seed = self.seed.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
            let rate = self.sample_rate as f32;
            self.voices.push(SynthVoice::new(t.instrument, freq, t.duration, rate, self.seed));
        }
    }

    /// Pull whatever the input stream has delivered since the last block.
    pub fn drain_input(&mut self) {
        let Some(rx) = &self.input_rx else {
            return;
        };
        while let Ok(frames) = rx.try_recv() {
            self.input_fifo.extend(frames);
        }
        // never let monitoring latency build up past half a second
        let max = self.sample_rate as usize / 2;
        if self.input_fifo.len() > max {
            let excess = self.input_fifo.len() - max;
            self.input_fifo.drain(..excess);
        }
    }

    fn render_voices(&mut self, from: usize, to: usize) {
        for v in self.voices.iter_mut() {
            v.render_into(&mut self.strip_bufs[v.instrument.index()][from..to]);
        }
        self.voices.retain(|v| v.active);
    }

    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        let n = out.len();
        out.fill(StereoFrame::zero());
        for buf in self.strip_bufs.iter_mut() {
            if buf.len() < n {
                buf.resize(n, StereoFrame::zero());
            }
            buf[..n].fill(StereoFrame::zero());
        }

        // Split the block at every scheduled trigger so each starts on its frame.
        let block_start = self.frame;
        let mut pos = 0;
        loop {
            while let Some(p) = self.pending.last() {
                if p.frame > block_start + pos as u64 {
                    break;
                }
                if let Some(p) = self.pending.pop() {
                    self.start_voices(p.params);
                }
            }
            let end = match self.pending.last() {
                Some(p) if p.frame < block_start + n as u64 => (p.frame - block_start) as usize,
                _ => n,
            };
            self.render_voices(pos, end);
            if end == n {
                break;
            }
            pos = end;
        }

        self.graph.process(&mut self.strip_bufs, out);
        self.render_input(out);

        if let Some((buffer, player)) = self.playback.as_mut() {
            player.render_into(buffer, out);
            if !player.active {
                self.playback = None;
            }
        }

        self.frame += n as u64;
        self.meters.frames.store(self.frame, Ordering::Release);
    }

    fn render_input(&mut self, out: &mut [StereoFrame]) {
        let n = out.len().min(self.input_fifo.len());
        if self.input_buf.len() < n {
            self.input_buf.resize(n, StereoFrame::zero());
        }
        let input = &mut self.input_buf[..n];
        let mut peak = 0.0f32;
        for (dst, src) in input.iter_mut().zip(self.input_fifo.drain(..n)) {
            peak = peak.max(src.peak());
            *dst = src;
        }
        self.meters.input_peak.store(peak.to_bits(), Ordering::Relaxed);

        if let Some(tap) = self.record_tap.as_mut() {
            tap.write(input);
        }

        self.guitar.process(input);
        if self.guitar.monitor {
            for (o, x) in out.iter_mut().zip(input.iter()) {
                *o += *x;
            }
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    fn voice_count(&self) -> usize {
        self.voices.len()
    }
}
