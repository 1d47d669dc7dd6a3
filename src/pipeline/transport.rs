//! The musical clock: BPM -> sixteenth-note step duration, a playhead that
//! wraps at the pattern length, and the wall-clock timer that wakes the
//! session once per step.
//!
//! Two clocks are involved. The [`StepTimer`] is a plain repeating timer and
//! only decides *when the session thread wakes up*. The time each step actually
//! sounds at is computed by [`Transport::advance`] on the audio clock, by adding
//! exact step durations to the previous step's time, so timer jitter never
//! reaches the audio output.

use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::audio_api::AudioTime;
use crate::shared::{MAX_BPM, MIN_BPM};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is already running")]
    AlreadyRunning,
}

/// Length of one sixteenth note at `bpm`.
pub fn step_duration(bpm: u32) -> Duration {
    Duration::from_secs_f64(step_duration_ms(bpm) / 1000.0)
}

pub fn step_duration_ms(bpm: u32) -> f64 {
    60_000.0 / bpm.max(1) as f64 / 4.0
}

pub fn clamp_bpm(bpm: u32) -> u32 {
    bpm.clamp(MIN_BPM, MAX_BPM)
}

/// One step boundary: which step, and when it sounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepTick {
    pub index: usize,
    pub at: AudioTime,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum TransportState {
    Stopped,
    Playing {
        current: Option<usize>, // None until the first tick
        next_at: AudioTime,
    },
}

#[derive(Clone, Debug)]
pub struct Transport {
    bpm: u32,
    step_count: usize,
    lookahead: f64, // seconds between "now" and the first step's audio time
    state: TransportState,
}

impl Transport {
    pub fn new(bpm: u32, step_count: usize, lookahead: Duration) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            step_count: step_count.max(1),
            lookahead: lookahead.as_secs_f64(),
            state: TransportState::Stopped,
        }
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, TransportState::Playing { .. })
    }

    /// The step that sounded last, `None` when stopped or not yet ticked.
    pub fn current_step(&self) -> Option<usize> {
        match self.state {
            TransportState::Playing { current, .. } => current,
            TransportState::Stopped => None,
        }
    }

    pub fn step_duration(&self) -> Duration {
        step_duration(self.bpm)
    }

    pub fn start(&mut self, now: AudioTime) -> Result<(), TransportError> {
        if self.is_playing() {
            return Err(TransportError::AlreadyRunning);
        }
        self.state = TransportState::Playing {
            current: None,
            next_at: now.offset(self.lookahead),
        };
        Ok(())
    }

    /// Returns whether the transport was running.
    pub fn stop(&mut self) -> bool {
        let was_playing = self.is_playing();
        self.state = TransportState::Stopped;
        was_playing
    }

    /// Takes effect from the step after the one already computed; the playhead
    /// doesn't move. Returns the clamped value.
    pub fn set_bpm(&mut self, bpm: u32) -> u32 {
        self.bpm = clamp_bpm(bpm);
        self.bpm
    }

    /// True when the next step lies so far ahead of the audio clock that this
    /// wake-up should be skipped (the wall-clock timer is running fast).
    pub fn is_ahead_of(&self, now: AudioTime) -> bool {
        match self.state {
            TransportState::Playing { next_at, .. } => {
                let limit = self.lookahead + step_duration(self.bpm).as_secs_f64();
                next_at.secs() - now.secs() > limit
            }
            TransportState::Stopped => false,
        }
    }

    /// Move the playhead one step and return where and when it lands.
    pub fn advance(&mut self, now: AudioTime) -> Option<StepTick> {
        let step_secs = step_duration(self.bpm).as_secs_f64();
        let step_count = self.step_count;
        let TransportState::Playing { current, next_at } = &mut self.state else {
            return None;
        };
        let index = current.map_or(0, |i| (i + 1) % step_count);
        // Fell behind the audio clock: restart the chain one lookahead out,
        // missed steps are not replayed.
        let at = if *next_at < now {
            let late_ms = (now.secs() - next_at.secs()) * 1000.0;
            log::debug!(target: "session", "transport resync: {late_ms:.1} ms late");
            now.offset(self.lookahead)
        } else {
            *next_at
        };
        *current = Some(index);
        *next_at = at.offset(step_secs);
        Some(StepTick { index, at })
    }
}

/// Repeating wall-clock timer that wakes the session thread once per step.
/// Idle timers never fire, so the receiver can always sit in a `select!`.
pub struct StepTimer {
    rx: Receiver<Instant>,
    interval: Option<Duration>,
}

impl StepTimer {
    pub fn idle() -> Self {
        Self {
            rx: crossbeam_channel::never(),
            interval: None,
        }
    }

    /// (Re)start ticking at `interval`; the first tick arrives one interval from now.
    pub fn arm(&mut self, interval: Duration) {
        self.rx = crossbeam_channel::tick(interval);
        self.interval = Some(interval);
    }

    pub fn disarm(&mut self) {
        self.rx = crossbeam_channel::never();
        self.interval = None;
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn receiver(&self) -> &Receiver<Instant> {
        &self.rx
    }
}

impl Default for StepTimer {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn transport(bpm: u32) -> Transport {
        Transport::new(bpm, 16, Duration::from_millis(50))
    }

    #[test]
    fn step_duration_is_a_sixteenth() {
        assert_relative_eq!(step_duration_ms(120), 125.0);
        assert_relative_eq!(step_duration_ms(60), 250.0);
        for bpm in MIN_BPM..=MAX_BPM {
            let expected = 60_000.0 / bpm as f64 / 4.0;
            let ms = step_duration(bpm).as_secs_f64() * 1000.0;
            assert_relative_eq!(ms, expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn first_tick_is_step_zero_after_lookahead() {
        let mut t = transport(120);
        t.start(AudioTime(1.0)).unwrap();
        assert_eq!(t.current_step(), None);
        let tick = t.advance(AudioTime(1.0)).unwrap();
        assert_eq!(tick.index, 0);
        assert_relative_eq!(tick.at.secs(), 1.05);
    }

    #[test]
    fn ticks_are_spaced_by_step_duration_and_wrap() {
        let mut t = transport(120);
        t.start(AudioTime(0.0)).unwrap();
        let mut last = t.advance(AudioTime(0.0)).unwrap();
        for n in 1..=20 {
            let tick = t.advance(AudioTime(0.0)).unwrap();
            assert_eq!(tick.index, n % 16);
            assert_relative_eq!(tick.at.secs() - last.at.secs(), 0.125, epsilon = 1e-9);
            last = tick;
        }
    }

    #[test]
    fn start_twice_reports_already_running() {
        let mut t = transport(120);
        t.start(AudioTime(0.0)).unwrap();
        assert_eq!(t.start(AudioTime(0.0)), Err(TransportError::AlreadyRunning));
    }

    #[test]
    fn stop_is_idempotent_and_resets_position() {
        let mut t = transport(120);
        assert!(!t.stop());
        t.start(AudioTime(0.0)).unwrap();
        t.advance(AudioTime(0.0));
        t.advance(AudioTime(0.0));
        assert!(t.stop());
        assert_eq!(t.current_step(), None);
        assert!(t.advance(AudioTime(0.0)).is_none());
        t.start(AudioTime(0.0)).unwrap();
        assert_eq!(t.advance(AudioTime(0.0)).unwrap().index, 0);
    }

    #[test]
    fn bpm_change_keeps_position_and_changes_spacing() {
        let mut t = transport(120);
        t.start(AudioTime(0.0)).unwrap();
        for _ in 0..4 {
            t.advance(AudioTime(0.0));
        }
        t.set_bpm(60);
        assert_eq!(t.current_step(), Some(3));
        // the boundary already computed at 120 bpm stays put...
        let a = t.advance(AudioTime(0.0)).unwrap();
        assert_eq!(a.index, 4);
        assert_relative_eq!(a.at.secs(), 0.05 + 4.0 * 0.125, epsilon = 1e-9);
        // ...and the new spacing applies after it
        let b = t.advance(AudioTime(0.0)).unwrap();
        assert_relative_eq!(b.at.secs() - a.at.secs(), 0.25, epsilon = 1e-9);
    }

    #[test]
    fn late_ticks_resync_with_the_lookahead_restored() {
        let mut t = transport(120);
        t.start(AudioTime(0.0)).unwrap();
        t.advance(AudioTime(0.0));
        let tick = t.advance(AudioTime(3.0)).unwrap();
        assert_eq!(tick.index, 1);
        assert_relative_eq!(tick.at.secs(), 3.05, epsilon = 1e-9);

        // later steps keep the lead as the timer carries on at the step rate
        let mut now = 3.0;
        for _ in 0..8 {
            now += 0.125;
            let tick = t.advance(AudioTime(now)).unwrap();
            assert_relative_eq!(tick.at.secs() - now, 0.05, epsilon = 1e-9);
        }
    }

    #[test]
    fn detects_running_ahead_of_audio_clock() {
        let mut t = transport(120);
        t.start(AudioTime(0.0)).unwrap();
        t.advance(AudioTime(0.0));
        assert!(!t.is_ahead_of(AudioTime(0.0)));
        t.advance(AudioTime(0.0));
        t.advance(AudioTime(0.0));
        assert!(t.is_ahead_of(AudioTime(0.0)));
    }

    #[test]
    fn bpm_is_clamped() {
        let mut t = transport(10);
        assert_eq!(t.bpm(), MIN_BPM);
        assert_eq!(t.set_bpm(1000), MAX_BPM);
    }

    #[test]
    fn timer_arms_and_disarms() {
        let mut timer = StepTimer::idle();
        assert!(timer.receiver().try_recv().is_err());
        timer.arm(Duration::from_millis(1));
        assert!(timer.receiver().recv_timeout(Duration::from_secs(1)).is_ok());
        timer.disarm();
        assert_eq!(timer.interval(), None);
        assert!(timer.receiver().recv_timeout(Duration::from_millis(20)).is_err());
    }
}
