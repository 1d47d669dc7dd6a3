//! The running sequencer: owns the tracks, the transport and the instrument
//! bank, and is the only thing that mutates any of them. Everything here runs
//! on the session (main) thread; the audio thread only ever sees commands.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;

use crate::audio::{format_duration, format_size, ReverbMix, SampleBuffer};
use crate::audio_api::{AudioCommand, AudioSink};
use crate::config::AppConfig;
use crate::pipeline::instrument::InstrumentBank;
use crate::pipeline::preset::{builtin_presets, Preset, PresetError, PresetTrack};
use crate::pipeline::store::TrackStore;
use crate::pipeline::track::TrackKind;
use crate::pipeline::transport::{StepTimer, Transport};
use crate::shared::{DisplayState, InputEvent, TrackRow, STEPS_PER_PATTERN};

type PresetListener = Box<dyn FnMut(&Preset)>;

struct Take {
    buffer: Arc<SampleBuffer>,
    label: String,
}

pub struct Session<S: AudioSink> {
    store: TrackStore,
    transport: Transport,
    bank: InstrumentBank<S>,
    timer: StepTimer,
    loaded_preset: Option<String>,
    saved_cursor: usize,
    on_preset_loaded: Option<PresetListener>,
    reverb: ReverbMix,
    recording: bool,
    last_take: Option<Take>,
    status: String,
}

impl<S: AudioSink> Session<S> {
    pub fn new(sink: S, config: &AppConfig) -> Self {
        let transport =
            Transport::new(config.sequencer.bpm, STEPS_PER_PATTERN, config.sequencer.lookahead());
        let bank = InstrumentBank::new(sink, &config.graph, transport.bpm());
        Self {
            store: TrackStore::with_defaults(),
            transport,
            bank,
            timer: StepTimer::idle(),
            loaded_preset: None,
            saved_cursor: 0,
            on_preset_loaded: None,
            reverb: config.guitar.mix.clamped(),
            recording: false,
            last_take: None,
            status: String::new(),
        }
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn bank(&self) -> &InstrumentBank<S> {
        &self.bank
    }

    pub fn sink(&self) -> &S {
        self.bank.sink()
    }

    /// Fires once per step while playing, never while stopped.
    pub fn timer(&self) -> &Receiver<Instant> {
        self.timer.receiver()
    }

    pub fn loaded_preset(&self) -> Option<&str> {
        self.loaded_preset.as_deref()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn on_preset_loaded(&mut self, listener: impl FnMut(&Preset) + 'static) {
        self.on_preset_loaded = Some(Box::new(listener));
    }

    // ── Transport ─────────────────────────────────────────────────

    pub fn play(&mut self) {
        if let Err(e) = self.transport.start(self.bank.now()) {
            log::debug!(target: "session", "play ignored: {e}");
            return;
        }
        log::info!(target: "session", "play at {} bpm", self.transport.bpm());
        self.on_tick();
        self.timer.arm(self.transport.step_duration());
    }

    /// Safe to call at any time; always leaves the transport stopped at no step.
    pub fn stop(&mut self) {
        self.timer.disarm();
        if self.transport.stop() {
            log::info!(target: "session", "stop");
        }
        if let Err(e) = self.bank.cancel_scheduled() {
            log::warn!(target: "session", "could not cancel scheduled notes: {e}");
        }
    }

    pub fn toggle_play(&mut self) {
        if self.transport.is_playing() {
            self.stop();
        } else {
            self.play();
        }
    }

    pub fn set_bpm(&mut self, bpm: u32) -> u32 {
        let bpm = self.transport.set_bpm(bpm);
        self.bank.set_tempo(bpm);
        if self.transport.is_playing() {
            self.timer.arm(self.transport.step_duration());
        }
        bpm
    }

    /// One step: every unmuted track with that step active sounds at the same
    /// audio time. The store is read as it is right now.
    pub fn on_tick(&mut self) {
        let now = self.bank.now();
        if self.transport.is_ahead_of(now) {
            log::trace!(target: "session", "timer ahead of audio clock, skipping wake");
            return;
        }
        let Some(tick) = self.transport.advance(now) else {
            return;
        };
        for track in self.store.tracks() {
            if track.muted {
                continue;
            }
            let Some(step) = track.steps.get(tick.index).filter(|s| s.active) else {
                continue;
            };
            if let Err(e) = self.bank.trigger(track.kind, &step.note, Some(tick.at)) {
                log::warn!(
                    target: "session",
                    "step {}: {} {:?} skipped: {e}",
                    tick.index,
                    track.id(),
                    step.note
                );
            }
        }
    }

    // ── Editing ───────────────────────────────────────────────────

    /// Turning a step on previews it once, unless the track is muted.
    pub fn toggle_step(&mut self, kind: TrackKind, index: usize) -> Option<bool> {
        let active = self.store.toggle_step(kind, index)?;
        if active {
            if let Some(track) = self.store.get(kind).filter(|t| !t.muted) {
                if let Err(e) = self.bank.trigger(kind, &track.steps[index].note, None) {
                    log::warn!(target: "session", "preview of {} failed: {e}", kind.id());
                }
            }
        }
        Some(active)
    }

    pub fn set_step_note(&mut self, kind: TrackKind, index: usize, note: &str) -> bool {
        self.store.set_step_note(kind, index, note)
    }

    pub fn cycle_step_note(&mut self, kind: TrackKind, index: usize, delta: i32) -> Option<String> {
        self.store.cycle_step_note(kind, index, delta).map(str::to_string)
    }

    pub fn set_volume(&mut self, kind: TrackKind, volume: f32) -> Option<f32> {
        let stored = self.store.set_volume(kind, volume)?;
        if let Err(e) = self.bank.set_volume(kind, stored) {
            log::warn!(target: "session", "volume for {} not applied: {e}", kind.id());
        }
        Some(stored)
    }

    pub fn toggle_mute(&mut self, kind: TrackKind) -> Option<bool> {
        self.store.toggle_mute(kind)
    }

    pub fn clear_track(&mut self, kind: TrackKind) -> bool {
        self.store.clear(kind)
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        if let Err(e) = self.bank.set_master_volume(volume) {
            log::warn!(target: "session", "master volume not applied: {e}");
        }
    }

    // ── Presets ───────────────────────────────────────────────────

    /// All or nothing: a preset that fails validation leaves the session as it
    /// was. Tracks the preset doesn't mention keep their current state.
    pub fn load_preset(&mut self, preset: &Preset) -> Result<(), PresetError> {
        preset.validate()?;
        if self.transport.is_playing() {
            self.stop();
        }
        self.set_bpm(preset.bpm);
        for kind in TrackKind::ALL {
            if let Some(track) = preset.track(kind) {
                self.store.apply_preset_track(kind, track);
            }
        }
        self.sync_gains();
        self.loaded_preset = Some(preset.name.clone());
        self.status = format!("Loaded \"{}\" at {} BPM", preset.name, preset.bpm);
        log::info!(target: "session", "loaded preset {:?}", preset.name);
        if let Some(listener) = self.on_preset_loaded.as_mut() {
            listener(preset);
        }
        Ok(())
    }

    /// Loads the next of `saved`, cycling through them on repeated calls.
    pub fn load_next_saved(&mut self, saved: &[Preset]) {
        if saved.is_empty() {
            self.status = "No saved presets yet, press s to save one".into();
            return;
        }
        let preset = &saved[self.saved_cursor % saved.len()];
        self.saved_cursor = self.saved_cursor.wrapping_add(1);
        if let Err(e) = self.load_preset(preset) {
            self.status = format!("Saved preset rejected: {e}");
        }
    }

    fn sync_gains(&mut self) {
        for track in self.store.tracks() {
            if let Err(e) = self.bank.set_volume(track.kind, track.volume) {
                log::warn!(target: "session", "volume for {} not applied: {e}", track.id());
            }
        }
    }

    pub fn to_preset(&self, name: &str, description: &str) -> Preset {
        self.store.tracks().iter().fold(
            Preset::new(name, description, self.transport.bpm()),
            |preset, track| {
                preset.with_track(
                    track.kind,
                    PresetTrack {
                        steps: track.steps.clone(),
                        volume: track.volume,
                        muted: track.muted,
                    },
                )
            },
        )
    }

    // ── Guitar ────────────────────────────────────────────────────

    pub fn reverb(&self) -> ReverbMix {
        self.reverb
    }

    fn send_reverb(&mut self) {
        if let Err(e) = self.bank.sink().send(AudioCommand::SetReverbMix(self.reverb)) {
            log::warn!(target: "audio", "reverb mix not applied: {e}");
        }
    }

    pub fn set_reverb_mix(&mut self, mix: f32) {
        self.reverb.set_reverb_mix(mix);
        self.send_reverb();
    }

    pub fn set_reverb_level(&mut self, level: f32) {
        self.reverb.set_reverb_level(level);
        self.send_reverb();
    }

    pub fn set_dry_level(&mut self, level: f32) {
        self.reverb.set_dry_level(level);
        self.send_reverb();
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Refused while there is no input device to record from.
    pub fn toggle_recording(&mut self) {
        if !self.recording && !self.sink().input_available() {
            log::warn!(target: "audio", "recording requested without an input device");
            self.status = "No input device: recording unavailable".into();
            return;
        }
        let cmd = if self.recording {
            AudioCommand::StopRecording
        } else {
            AudioCommand::StartRecording
        };
        match self.bank.sink().send(cmd) {
            Ok(()) => {
                self.recording = !self.recording;
                self.status =
                    if self.recording { "Recording…".into() } else { "Saving take…".into() };
            }
            Err(e) => {
                log::warn!(target: "audio", "recording toggle failed: {e}");
                self.status = format!("Recording unavailable: {e}");
            }
        }
    }

    /// Called once the audio thread has handed over a finished take and it
    /// has been written to disk.
    pub fn take_saved(&mut self, buffer: Arc<SampleBuffer>, file_name: &str, size: u64) {
        let label = format!(
            "{file_name}  {}  {}",
            format_duration(buffer.duration_secs()),
            format_size(size)
        );
        self.status = format!("Saved {label}");
        self.last_take = Some(Take { buffer, label });
    }

    /// The engine finished a take that captured nothing.
    pub fn take_discarded(&mut self) {
        self.status = "Nothing was captured, take discarded".into();
    }

    pub fn play_take(&mut self) {
        let Some(take) = &self.last_take else {
            self.status = "Nothing recorded yet".into();
            return;
        };
        let cmd = AudioCommand::PlayRecording(Arc::clone(&take.buffer));
        if let Err(e) = self.bank.sink().send(cmd) {
            log::warn!(target: "audio", "playback failed: {e}");
        }
    }

    // ── Front-end ─────────────────────────────────────────────────

    /// Session-level events. Quitting, saving and generation need the app
    /// around the session and are handled there.
    pub fn handle_input(&mut self, event: InputEvent) {
        match event {
            InputEvent::TogglePlay => self.toggle_play(),
            InputEvent::Stop => self.stop(),
            InputEvent::AdjustBpm(delta) => {
                let bpm = self.transport.bpm().saturating_add_signed(delta);
                self.set_bpm(bpm);
            }
            InputEvent::ToggleStep { track, step } => {
                self.toggle_step(track, step);
            }
            InputEvent::CycleNote { track, step, delta } => {
                self.cycle_step_note(track, step, delta);
            }
            InputEvent::AdjustVolume { track, delta } => {
                if let Some(current) = self.store.get(track).map(|t| t.volume) {
                    self.set_volume(track, current + delta);
                }
            }
            InputEvent::ToggleMute(track) => {
                self.toggle_mute(track);
            }
            InputEvent::ClearTrack(track) => {
                self.clear_track(track);
            }
            InputEvent::AdjustMasterVolume(delta) => {
                let v = self.bank.master_volume() + delta;
                self.set_master_volume(v);
            }
            InputEvent::LoadBuiltin(i) => match builtin_presets().get(i) {
                Some(preset) => {
                    if let Err(e) = self.load_preset(preset) {
                        self.status = format!("Preset rejected: {e}");
                    }
                }
                None => self.status = format!("No built-in preset {}", i + 1),
            },
            InputEvent::AdjustReverbMix(delta) => {
                let mix = self.reverb.wet + delta;
                self.set_reverb_mix(mix);
            }
            InputEvent::ToggleRecording => self.toggle_recording(),
            InputEvent::PlayTake => self.play_take(),
            InputEvent::Quit
            | InputEvent::SavePreset
            | InputEvent::LoadSavedPreset
            | InputEvent::Generate(_)
            | InputEvent::VoiceRequest(_) => {}
        }
    }

    pub fn display_state(&self) -> DisplayState {
        DisplayState {
            rows: self
                .store
                .tracks()
                .iter()
                .map(|t| TrackRow {
                    kind: t.kind,
                    name: t.name.clone(),
                    color: t.color,
                    steps: t.steps.clone(),
                    volume: t.volume,
                    muted: t.muted,
                })
                .collect(),
            playing_step: self.transport.current_step(),
            playing: self.transport.is_playing(),
            bpm: self.transport.bpm(),
            master_volume: self.bank.master_volume(),
            preset_name: self.loaded_preset.clone(),
            reverb: self.reverb,
            recording: self.recording,
            last_take: self.last_take.as_ref().map(|t| t.label.clone()),
            input_level: None,
            busy: false,
            status: self.status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::audio_api::testing::RecordingSink;
    use crate::pipeline::persistence;
    use crate::audio_api::{AudioTime, TriggerParams};
    use crate::pipeline::instrument::gain_to_db;
    use crate::pipeline::transport::step_duration;
    use approx::assert_relative_eq;

    const STEP_SECS: f64 = 0.125; // at 120 bpm

    fn session() -> (Session<Rc<RecordingSink>>, Rc<RecordingSink>) {
        let sink = Rc::new(RecordingSink::default());
        let session = Session::new(Rc::clone(&sink), &AppConfig::default());
        (session, sink)
    }

    /// A session with nothing active anywhere.
    fn blank_session() -> (Session<Rc<RecordingSink>>, Rc<RecordingSink>) {
        let (mut s, sink) = session();
        for kind in TrackKind::ALL {
            s.clear_track(kind);
        }
        (s, sink)
    }

    fn run_ticks(s: &mut Session<Rc<RecordingSink>>, sink: &RecordingSink, n: usize) {
        for _ in 0..n {
            sink.advance(STEP_SECS);
            s.on_tick();
        }
    }

    fn triggers_for(sink: &RecordingSink, kind: TrackKind) -> Vec<TriggerParams> {
        sink.triggers().into_iter().filter(|t| t.instrument == kind).collect()
    }

    #[test]
    fn step_spacing_matches_step_duration() {
        let (mut s, sink) = blank_session();
        for i in 0..8 {
            s.toggle_step(TrackKind::Kick, i);
        }
        sink.clear();
        s.play();
        run_ticks(&mut s, &sink, 7);
        let at: Vec<f64> =
            triggers_for(&sink, TrackKind::Kick).iter().map(|t| t.at.unwrap().secs()).collect();
        assert_eq!(at.len(), 8);
        let step = step_duration(120).as_secs_f64();
        for pair in at.windows(2) {
            assert_relative_eq!(pair[1] - pair[0], step, epsilon = 1e-9);
        }
    }

    #[test]
    fn lead_time_comes_back_after_a_stall() {
        let (mut s, sink) = blank_session();
        for i in 0..16 {
            s.toggle_step(TrackKind::Hihat, i);
        }
        sink.clear();
        s.play();
        run_ticks(&mut s, &sink, 2);
        sink.advance(0.3); // the session thread was busy
        s.on_tick();
        let stalled_at = sink.clock.get();
        run_ticks(&mut s, &sink, 8);

        let at: Vec<f64> =
            triggers_for(&sink, TrackKind::Hihat).iter().map(|t| t.at.unwrap().secs()).collect();
        assert_eq!(at.len(), 12);
        assert_relative_eq!(at[3] - stalled_at, 0.05, epsilon = 1e-9);
        for (n, t) in at[4..].iter().enumerate() {
            let now = stalled_at + (n + 1) as f64 * STEP_SECS;
            assert_relative_eq!(t - now, 0.05, epsilon = 1e-9);
        }
    }

    #[test]
    fn all_tracks_on_a_step_share_one_time() {
        let (mut s, sink) = session();
        s.play();
        let triggers = sink.triggers();
        assert!(triggers.len() >= 2); // kick and hihat on step 0
        assert!(triggers.iter().all(|t| t.at == triggers[0].at));
        assert_eq!(triggers[0].at, Some(AudioTime(0.05)));
    }

    #[test]
    fn stop_then_play_restarts_at_zero() {
        let (mut s, sink) = session();
        s.play();
        run_ticks(&mut s, &sink, 5);
        assert_eq!(s.transport().current_step(), Some(5));
        s.stop();
        assert_eq!(s.transport().current_step(), None);
        assert!(!s.transport().is_playing());
        assert!(s.timer().try_recv().is_err());
        assert!(matches!(sink.sent.borrow().last(), Some(AudioCommand::CancelScheduled)));
        s.play();
        assert_eq!(s.transport().current_step(), Some(0));
    }

    #[test]
    fn stop_and_play_are_idempotent() {
        let (mut s, sink) = session();
        s.stop();
        s.stop();
        assert!(!s.transport().is_playing());
        s.play();
        sink.clear();
        s.play(); // already running: nothing happens
        assert!(sink.triggers().is_empty());
        assert_eq!(s.transport().current_step(), Some(0));
    }

    #[test]
    fn muting_suppresses_and_unmuting_resumes_next_tick() {
        let (mut s, sink) = blank_session();
        for i in 0..STEPS_PER_PATTERN {
            s.toggle_step(TrackKind::Snare, i);
        }
        s.toggle_mute(TrackKind::Snare);
        sink.clear();
        s.play();
        run_ticks(&mut s, &sink, 3);
        assert!(triggers_for(&sink, TrackKind::Snare).is_empty());
        s.toggle_mute(TrackKind::Snare);
        run_ticks(&mut s, &sink, 1);
        assert_eq!(triggers_for(&sink, TrackKind::Snare).len(), 1);
    }

    #[test]
    fn edits_are_seen_by_the_very_next_tick() {
        let (mut s, sink) = blank_session();
        s.play();
        s.toggle_step(TrackKind::Lead, 1);
        s.set_step_note(TrackKind::Lead, 1, "G5");
        sink.clear();
        run_ticks(&mut s, &sink, 1);
        let lead = triggers_for(&sink, TrackKind::Lead);
        assert_eq!(lead.len(), 1);
        assert_relative_eq!(lead[0].pitches[0], 783.99, epsilon = 0.01);
    }

    #[test]
    fn toggling_on_previews_once_and_off_never() {
        let (mut s, sink) = blank_session();
        sink.clear();
        assert_eq!(s.toggle_step(TrackKind::Bass, 3), Some(true));
        let previews = sink.triggers();
        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].at, None);
        sink.clear();
        assert_eq!(s.toggle_step(TrackKind::Bass, 3), Some(false));
        assert!(sink.triggers().is_empty());
    }

    #[test]
    fn no_preview_on_muted_track_or_bad_index() {
        let (mut s, sink) = blank_session();
        s.toggle_mute(TrackKind::Pad);
        sink.clear();
        assert_eq!(s.toggle_step(TrackKind::Pad, 0), Some(true));
        assert_eq!(s.toggle_step(TrackKind::Pad, STEPS_PER_PATTERN), None);
        assert!(sink.triggers().is_empty());
    }

    #[test]
    fn bpm_change_keeps_position_and_changes_spacing() {
        let (mut s, sink) = blank_session();
        for i in 0..STEPS_PER_PATTERN {
            s.toggle_step(TrackKind::Hihat, i);
        }
        sink.clear();
        s.play();
        run_ticks(&mut s, &sink, 3);
        assert_eq!(s.set_bpm(60), 60);
        assert_eq!(s.transport().current_step(), Some(3));
        assert_eq!(s.timer.interval(), Some(step_duration(60)));
        run_ticks(&mut s, &sink, 1); // already scheduled at the old spacing
        sink.advance(0.25);
        s.on_tick();
        let at: Vec<f64> =
            triggers_for(&sink, TrackKind::Hihat).iter().map(|t| t.at.unwrap().secs()).collect();
        assert_eq!(s.transport().current_step(), Some(5));
        assert_relative_eq!(at[5] - at[4], 0.25, epsilon = 1e-9);
    }

    #[test]
    fn bpm_is_clamped() {
        let (mut s, _) = session();
        assert_eq!(s.set_bpm(5), 40);
        assert_eq!(s.set_bpm(500), 240);
        s.handle_input(InputEvent::AdjustBpm(-1000));
        assert_eq!(s.transport().bpm(), 40);
    }

    #[test]
    fn one_failing_track_does_not_stop_the_rest() {
        let (mut s, sink) = session();
        sink.fail_for.set(Some(TrackKind::Kick));
        s.play();
        assert!(triggers_for(&sink, TrackKind::Kick).is_empty());
        assert_eq!(triggers_for(&sink, TrackKind::Hihat).len(), 1);
        run_ticks(&mut s, &sink, 2);
        assert!(s.transport().is_playing());
        assert_eq!(triggers_for(&sink, TrackKind::Hihat).len(), 2);
    }

    #[test]
    fn bad_notes_are_skipped_not_fatal() {
        let (mut s, sink) = blank_session();
        s.toggle_step(TrackKind::Lead, 0);
        s.set_step_note(TrackKind::Lead, 0, "H9");
        s.toggle_step(TrackKind::Kick, 0);
        sink.clear();
        s.play();
        assert!(triggers_for(&sink, TrackKind::Lead).is_empty());
        assert_eq!(triggers_for(&sink, TrackKind::Kick).len(), 1);
    }

    #[test]
    fn volume_goes_straight_to_the_bank() {
        let (mut s, _) = session();
        assert_eq!(s.set_volume(TrackKind::Piano, 1.7), Some(1.0));
        assert_relative_eq!(s.bank().effective_gain_db(TrackKind::Piano).unwrap(), 0.0);
        s.set_volume(TrackKind::Kick, 0.5);
        assert_relative_eq!(
            s.bank().effective_gain_db(TrackKind::Kick).unwrap(),
            3.0 + gain_to_db(0.5)
        );
    }

    fn preset_with_kick_only() -> Preset {
        Preset::new("Kick Only", "four on the floor", 100)
            .with_track(TrackKind::Kick, PresetTrack::from_fn(0.9, false, |i| (i % 4 == 0, "C1")))
    }

    #[test]
    fn load_preset_is_idempotent() {
        let (mut s, _) = session();
        let preset = builtin_presets().remove(1);
        s.load_preset(&preset).unwrap();
        let once = s.to_preset("x", "y");
        s.load_preset(&preset).unwrap();
        assert_eq!(s.to_preset("x", "y"), once);
        assert_eq!(s.transport().bpm(), preset.bpm);
        assert_eq!(s.loaded_preset(), Some(preset.name.as_str()));
    }

    #[test]
    fn partial_preset_leaves_other_tracks_alone() {
        let (mut s, _) = session();
        let snare_before = s.store().get(TrackKind::Snare).cloned();
        s.load_preset(&preset_with_kick_only()).unwrap();
        assert_eq!(s.store().get(TrackKind::Snare).cloned(), snare_before);
        let kick = s.store().get(TrackKind::Kick).unwrap();
        assert_eq!(kick.active_steps(), STEPS_PER_PATTERN / 4);
        assert_relative_eq!(kick.volume, 0.9);
        assert_eq!(s.transport().bpm(), 100);
    }

    #[test]
    fn malformed_preset_changes_nothing() {
        let (mut s, sink) = session();
        s.play();
        let before = s.to_preset("x", "y");
        let mut bad = preset_with_kick_only();
        bad.tracks.get_mut("kick").unwrap().steps.truncate(16);
        sink.clear();
        assert!(matches!(s.load_preset(&bad), Err(PresetError::StepCount { .. })));
        assert_eq!(s.to_preset("x", "y"), before);
        assert!(s.transport().is_playing());
        assert!(sink.sent.borrow().is_empty());

        let too_fast = Preset { bpm: 900, ..preset_with_kick_only() };
        assert!(matches!(s.load_preset(&too_fast), Err(PresetError::BpmOutOfRange(900))));
    }

    #[test]
    fn loading_stops_playback_and_notifies() {
        let (mut s, _) = session();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_in_listener = Rc::clone(&seen);
        s.on_preset_loaded(move |p| seen_in_listener.borrow_mut().push(p.name.clone()));
        s.play();
        s.load_preset(&preset_with_kick_only()).unwrap();
        assert!(!s.transport().is_playing());
        assert_eq!(*seen.borrow(), vec!["Kick Only".to_string()]);
    }

    #[test]
    fn unknown_tracks_in_presets_are_ignored() {
        let (mut s, _) = session();
        let mut preset = preset_with_kick_only();
        preset.tracks.insert("cowbell".into(), PresetTrack::silent("C1", 1.0, false));
        assert!(s.load_preset(&preset).is_ok());
    }

    #[test]
    fn reverb_mix_is_clamped_and_sent_whole() {
        let (mut s, sink) = session();
        s.set_reverb_mix(0.5);
        assert_eq!((s.reverb().dry, s.reverb().wet), (0.5, 0.5));
        s.set_reverb_mix(3.0);
        assert_eq!((s.reverb().dry, s.reverb().wet), (0.0, 1.0));
        assert!(matches!(
            sink.sent.borrow().last(),
            Some(AudioCommand::SetReverbMix(ReverbMix { dry, wet, .. }))
                if *dry == 0.0 && *wet == 1.0
        ));
    }

    #[test]
    fn recording_round_trip() {
        let (mut s, sink) = session();
        s.toggle_recording();
        assert!(s.is_recording());
        s.toggle_recording();
        assert!(!s.is_recording());
        let sent = sink.sent.borrow();
        assert!(matches!(sent[sent.len() - 2], AudioCommand::StartRecording));
        assert!(matches!(sent[sent.len() - 1], AudioCommand::StopRecording));
        drop(sent);

        let buffer = Arc::new(SampleBuffer::new(vec![Default::default(); 44_100 * 3], 44_100));
        s.take_saved(buffer, "take-1.wav", 2048);
        assert_eq!(s.display_state().last_take.as_deref(), Some("take-1.wav  0:03  2.0 KB"));
        s.play_take();
        assert!(matches!(sink.sent.borrow().last(), Some(AudioCommand::PlayRecording(_))));
    }

    #[test]
    fn saved_presets_load_back_in_turn() {
        let dir = tempfile::tempdir().unwrap();
        let (mut s, _sink) = session();
        s.load_next_saved(&[]);
        assert_eq!(s.loaded_preset(), None);

        s.set_bpm(97);
        s.toggle_mute(TrackKind::Bass);
        persistence::save_preset(dir.path(), &s.to_preset("Mine", "saved by hand")).unwrap();
        let original = s.to_preset("Mine", "saved by hand");
        s.load_preset(&builtin_presets()[0]).unwrap();
        persistence::save_preset(dir.path(), &s.to_preset("Other", "")).unwrap();

        s.play();
        let saved = persistence::list_presets(dir.path());
        assert_eq!(saved.len(), 2);
        s.load_next_saved(&saved);
        assert_eq!(s.loaded_preset(), Some("Mine"));
        assert!(!s.transport().is_playing());
        assert_eq!(s.to_preset("Mine", "saved by hand"), original);
        s.load_next_saved(&saved);
        assert_eq!(s.loaded_preset(), Some("Other"));
        s.load_next_saved(&saved);
        assert_eq!(s.loaded_preset(), Some("Mine"));
    }

    #[test]
    fn recording_needs_an_input_device() {
        let (mut s, sink) = session();
        sink.no_input.set(true);
        sink.clear();
        s.toggle_recording();
        assert!(!s.is_recording());
        assert!(sink.sent.borrow().is_empty());
        assert_eq!(s.display_state().status, "No input device: recording unavailable");

        s.take_discarded();
        assert_eq!(s.display_state().last_take, None);
    }

    #[test]
    fn display_state_mirrors_the_session() {
        let (mut s, sink) = session();
        s.play();
        run_ticks(&mut s, &sink, 2);
        let ds = s.display_state();
        assert_eq!(ds.rows.len(), TrackKind::COUNT);
        assert_eq!(ds.playing_step, Some(2));
        assert!(ds.playing);
        assert_eq!(ds.bpm, 120);
        assert_relative_eq!(ds.master_volume, 0.7);
    }
}
