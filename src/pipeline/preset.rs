//! Presets: a named bundle of tempo plus per-track patterns and mix settings.
//!
//! The JSON form is shared with the preset generators, so field names follow
//! the wire shape exactly (`tracks` keyed by track id string).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::track::{Step, TrackKind};
use crate::shared::{MAX_BPM, MIN_BPM, STEPS_PER_PATTERN};

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("preset JSON is malformed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("bpm {0} is outside {MIN_BPM}..={MAX_BPM}")]
    BpmOutOfRange(u32),
    #[error("track {track:?} has {found} steps, expected {expected}")]
    StepCount { track: String, expected: usize, found: usize },
    #[error("track {track:?} has a non-finite volume")]
    Volume { track: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresetTrack {
    pub steps: Vec<Step>,
    pub volume: f32,
    pub muted: bool,
}

impl PresetTrack {
    /// Build a full-length track from a per-step `(active, note)` function.
    pub fn from_fn<F>(volume: f32, muted: bool, mut f: F) -> Self
    where
        F: FnMut(usize) -> (bool, &'static str),
    {
        let steps = (0..STEPS_PER_PATTERN)
            .map(|i| {
                let (active, note) = f(i);
                Step::new(active, note)
            })
            .collect();
        Self { steps, volume, muted }
    }

    /// A full-length track with nothing active.
    pub fn silent(note: &'static str, volume: f32, muted: bool) -> Self {
        Self::from_fn(volume, muted, |_| (false, note))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub description: String,
    pub bpm: u32,
    pub tracks: BTreeMap<String, PresetTrack>,
}

impl Preset {
    pub fn new(name: impl Into<String>, description: impl Into<String>, bpm: u32) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            bpm,
            tracks: BTreeMap::new(),
        }
    }

    pub fn with_track(mut self, kind: TrackKind, track: PresetTrack) -> Self {
        self.tracks.insert(kind.id().to_string(), track);
        self
    }

    pub fn track(&self, kind: TrackKind) -> Option<&PresetTrack> {
        self.tracks.get(kind.id())
    }

    /// Parse and validate; `bpm` and `tracks` are required fields.
    pub fn from_json(json: &str) -> Result<Self, PresetError> {
        let preset: Preset = serde_json::from_str(json)?;
        preset.validate()?;
        Ok(preset)
    }

    pub fn to_json(&self) -> Result<String, PresetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks everything the loader relies on. Entries for unknown track ids are
    /// not inspected since the loader ignores them.
    pub fn validate(&self) -> Result<(), PresetError> {
        if !(MIN_BPM..=MAX_BPM).contains(&self.bpm) {
            return Err(PresetError::BpmOutOfRange(self.bpm));
        }
        for (id, track) in &self.tracks {
            if TrackKind::from_id(id).is_none() {
                continue;
            }
            if track.steps.len() != STEPS_PER_PATTERN {
                return Err(PresetError::StepCount {
                    track: id.clone(),
                    expected: STEPS_PER_PATTERN,
                    found: track.steps.len(),
                });
            }
            if !track.volume.is_finite() {
                return Err(PresetError::Volume { track: id.clone() });
            }
        }
        Ok(())
    }

    /// Lowercase, dash-separated form of the name, used for file names.
    pub fn slug(&self) -> String {
        let mut slug = String::new();
        for c in self.name.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('-') && !slug.is_empty() {
                slug.push('-');
            }
        }
        let trimmed = slug.trim_end_matches('-');
        if trimmed.is_empty() { "preset".to_string() } else { trimmed.to_string() }
    }
}

/// Picks one of four values by bar (16 steps each).
pub fn per_bar(i: usize, bars: [&'static str; 4]) -> &'static str {
    bars[(i / 16).min(3)]
}

/// The presets that ship with the app.
pub fn builtin_presets() -> Vec<Preset> {
    use TrackKind::*;
    const PROGRESSION: [&str; 4] = ["C", "Am", "F", "G"];
    const ROOTS: [&str; 4] = ["C2", "A1", "F2", "G2"];

    let slow = Preset::new(
        "Slow & Sad Emotional",
        "Melancholic ballad in C major for emotional guitar solos - perfect for expressive playing",
        75,
    )
    .with_track(Kick, PresetTrack::from_fn(0.4, false, |i| (i % 16 == 0, "C1")))
    .with_track(Snare, PresetTrack::from_fn(0.3, false, |i| (i % 16 == 8, "C2")))
    .with_track(Hihat, PresetTrack::from_fn(0.2, false, |i| (i % 4 == 2, "C3")))
    .with_track(Bass, PresetTrack::from_fn(0.7, false, |i| (i % 8 == 0, per_bar(i, ROOTS))))
    .with_track(
        Piano,
        PresetTrack::from_fn(0.6, false, |i| {
            (i % 16 == 4 || i % 16 == 11, per_bar(i, PROGRESSION))
        }),
    )
    .with_track(Pad, PresetTrack::from_fn(0.4, false, |i| (i % 16 == 0, per_bar(i, PROGRESSION))))
    .with_track(Lead, PresetTrack::silent("C4", 0.3, true));

    // 12-bar feel squeezed into four bars: I I IV IV / I V
    let blues_bass = |i: usize| match i {
        0..24 => "C2",
        24..40 => "F2",
        40..48 => "C2",
        _ => "G2",
    };
    let blues_piano = |i: usize| match i {
        0..24 => "C",
        24..40 => "F",
        40..48 => "C",
        48..56 => "G",
        _ => "C",
    };
    let blues = Preset::new(
        "Blues Groove",
        "Authentic 12-bar blues progression with shuffle feel - \
         perfect for blues guitar improvisation",
        115,
    )
    .with_track(Kick, PresetTrack::from_fn(0.6, false, |i| (i % 4 == 0, "C1")))
    .with_track(Snare, PresetTrack::from_fn(0.5, false, |i| (i % 8 == 6, "D2")))
    .with_track(Hihat, PresetTrack::from_fn(0.4, false, |i| (i % 2 == 1, "C3")))
    .with_track(Bass, PresetTrack::from_fn(0.8, false, |i| (i % 2 == 0, blues_bass(i))))
    .with_track(Piano, PresetTrack::from_fn(0.7, false, |i| (i % 2 == 1, blues_piano(i))))
    .with_track(Pad, PresetTrack::silent("C", 0.3, true))
    .with_track(Lead, PresetTrack::silent("C4", 0.4, true));

    let rock = Preset::new(
        "Energetic Rock",
        "Driving rock rhythm with powerful drums and energy - \
         perfect for high-intensity guitar playing",
        145,
    )
    .with_track(Kick, PresetTrack::from_fn(0.8, false, |i| (i % 8 == 0 || i % 16 == 6, "C1")))
    .with_track(Snare, PresetTrack::from_fn(0.7, false, |i| (i % 8 == 4, "D2")))
    .with_track(Hihat, PresetTrack::from_fn(0.5, false, |_| (true, "C3")))
    .with_track(Bass, PresetTrack::from_fn(0.8, false, |i| (i % 2 == 0, per_bar(i, ROOTS))))
    .with_track(Piano, PresetTrack::silent("C", 0.4, true))
    .with_track(Pad, PresetTrack::from_fn(0.5, false, |i| (i % 16 == 0, per_bar(i, PROGRESSION))))
    .with_track(
        Lead,
        PresetTrack::from_fn(0.6, false, |i| (i % 16 == 12, per_bar(i, ["G4", "C5", "F4", "G4"]))),
    );

    vec![slow, blues, rock]
}
