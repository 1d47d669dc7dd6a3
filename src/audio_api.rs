use std::sync::Arc;

use thiserror::Error;

pub use crate::audio::{ReverbMix, SampleBuffer};
use crate::pipeline::track::TrackKind;

/// A point on the audio-output clock, in seconds since the stream started.
/// Everything scheduled for the engine is expressed on this clock, never on
/// wall-clock time.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct AudioTime(pub f64);

impl AudioTime {
    pub fn secs(self) -> f64 {
        self.0
    }

    pub fn from_frames(frames: u64, sample_rate: u32) -> Self {
        Self(frames as f64 / sample_rate as f64)
    }

    pub fn to_frame(self, sample_rate: u32) -> u64 {
        (self.0.max(0.0) * sample_rate as f64).round() as u64
    }

    pub fn offset(self, secs: f64) -> Self {
        Self(self.0 + secs)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TriggerParams {
    pub instrument: TrackKind,
    pub pitches: Vec<f32>, // Hz; chords carry several
    pub duration: f32,     // seconds until release
    pub at: Option<AudioTime>, // None = as soon as possible
}

#[derive(Clone, Debug)]
pub enum AudioCommand {
    Trigger(TriggerParams),

    // Drop every trigger that is queued but hasn't started yet
    CancelScheduled,

    SetInstrumentGain { instrument: TrackKind, gain_db: f32 },
    SetMasterGain(f32),

    // Guitar input path
    SetReverbMix(ReverbMix),
    StartRecording,
    StopRecording,
    PlayRecording(Arc<SampleBuffer>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AudioError {
    #[error("audio command queue is full")]
    QueueFull,
    #[error("audio engine has shut down")]
    Disconnected,
}

/// Where the session sends its commands. The real implementation is the cpal
/// backed `AudioHandle`; tests substitute a recorder.
pub trait AudioSink {
    fn send(&self, cmd: AudioCommand) -> Result<(), AudioError>;

    /// Current position of the audio clock.
    fn now(&self) -> AudioTime;

    /// False when no capture device could be opened; recording is refused then.
    fn input_available(&self) -> bool;
}

#[cfg(test)]
pub mod testing {
    use std::cell::{Cell, RefCell};

    use super::*;

    /// Records every command; the clock only moves when the test says so.
    #[derive(Default)]
    pub struct RecordingSink {
        pub sent: RefCell<Vec<AudioCommand>>,
        pub clock: Cell<f64>,
        pub fail_for: Cell<Option<TrackKind>>,
        pub no_input: Cell<bool>,
    }

    impl RecordingSink {
        pub fn triggers(&self) -> Vec<TriggerParams> {
            self.sent
                .borrow()
                .iter()
                .filter_map(|c| match c {
                    AudioCommand::Trigger(t) => Some(t.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn clear(&self) {
            self.sent.borrow_mut().clear();
        }

        pub fn advance(&self, secs: f64) {
            self.clock.set(self.clock.get() + secs);
        }
    }

    impl AudioSink for RecordingSink {
        fn send(&self, cmd: AudioCommand) -> Result<(), AudioError> {
            if let AudioCommand::Trigger(t) = &cmd {
                if self.fail_for.get() == Some(t.instrument) {
                    return Err(AudioError::QueueFull);
                }
            }
            self.sent.borrow_mut().push(cmd);
            Ok(())
        }

        fn now(&self) -> AudioTime {
            AudioTime(self.clock.get())
        }

        fn input_available(&self) -> bool {
            !self.no_input.get()
        }
    }

    impl<T: AudioSink + ?Sized> AudioSink for std::rc::Rc<T> {
        fn send(&self, cmd: AudioCommand) -> Result<(), AudioError> {
            (**self).send(cmd)
        }

        fn now(&self) -> AudioTime {
            (**self).now()
        }

        fn input_available(&self) -> bool {
            (**self).input_available()
        }
    }
}
