// The session's tracks. The tick handler reads this directly, so every
// mutation is visible to the very next tick.

use crate::pipeline::preset::PresetTrack;
use crate::pipeline::track::{Step, Track, TrackKind};

#[derive(Clone, Debug)]
pub struct TrackStore {
    tracks: Vec<Track>,
    revision: u64, // bumped on every mutation so the front-end knows to redraw
}

impl TrackStore {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks, revision: 0 }
    }

    /// Every known kind with its default pattern.
    pub fn with_defaults() -> Self {
        Self::new(TrackKind::ALL.into_iter().map(Track::with_default_pattern).collect())
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, kind: TrackKind) -> Option<&Track> {
        self.tracks.iter().find(|t| t.kind == kind)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn get_mut(&mut self, kind: TrackKind) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.kind == kind)
    }

    fn step_mut(&mut self, kind: TrackKind, index: usize) -> Option<&mut Step> {
        self.get_mut(kind)?.steps.get_mut(index)
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Flip a step; returns the new `active` value, or `None` if the track or
    /// index doesn't exist.
    pub fn toggle_step(&mut self, kind: TrackKind, index: usize) -> Option<bool> {
        let step = self.step_mut(kind, index)?;
        step.active = !step.active;
        let active = step.active;
        self.touch();
        Some(active)
    }

    pub fn set_step_note(&mut self, kind: TrackKind, index: usize, note: &str) -> bool {
        let Some(step) = self.step_mut(kind, index) else {
            return false;
        };
        step.note = note.to_string();
        self.touch();
        true
    }

    /// Move a step's note through the kind's palette. A note that isn't in the
    /// palette jumps to its first entry.
    pub fn cycle_step_note(&mut self, kind: TrackKind, index: usize, delta: i32) -> Option<&str> {
        let palette = kind.palette();
        let step = self.step_mut(kind, index)?;
        let next = match palette.iter().position(|n| *n == step.note) {
            Some(pos) => (pos as i32 + delta).rem_euclid(palette.len() as i32) as usize,
            None => 0,
        };
        step.note = palette[next].to_string();
        self.touch();
        self.get(kind).map(|t| t.steps[index].note.as_str())
    }

    /// Clamp and store; returns the stored value.
    pub fn set_volume(&mut self, kind: TrackKind, volume: f32) -> Option<f32> {
        let track = self.get_mut(kind)?;
        track.volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        let stored = track.volume;
        self.touch();
        Some(stored)
    }

    pub fn toggle_mute(&mut self, kind: TrackKind) -> Option<bool> {
        let track = self.get_mut(kind)?;
        track.muted = !track.muted;
        let muted = track.muted;
        self.touch();
        Some(muted)
    }

    /// Deactivate every step; notes and volume stay.
    pub fn clear(&mut self, kind: TrackKind) -> bool {
        let Some(track) = self.get_mut(kind) else {
            return false;
        };
        for step in &mut track.steps {
            step.active = false;
        }
        self.touch();
        true
    }

    /// Replace steps, volume and mute wholesale. The caller validates lengths.
    pub fn apply_preset_track(&mut self, kind: TrackKind, preset: &PresetTrack) -> bool {
        let Some(track) = self.get_mut(kind) else {
            return false;
        };
        track.steps = preset.steps.clone();
        track.volume = preset.volume.clamp(0.0, 1.0);
        track.muted = preset.muted;
        self.touch();
        true
    }
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}
