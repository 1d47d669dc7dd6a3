//! Keyword-based style detection and the fixed backing-track patterns that go
//! with each style.

use crate::pipeline::preset::{per_bar, Preset, PresetTrack};
use crate::pipeline::track::TrackKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Style {
    Slow,
    Rock,
    Blues,
    Jazz,
    Custom,
}

impl Style {
    pub fn bpm(self) -> u32 {
        match self {
            Style::Slow => 75,
            Style::Rock => 140,
            Style::Blues => 100,
            Style::Jazz => 110,
            Style::Custom => 120,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Style::Slow => "Slow",
            Style::Rock => "Rock",
            Style::Blues => "Blues",
            Style::Jazz => "Jazz",
            Style::Custom => "Custom",
        }
    }
}

// First match wins, so "slow blues" is Slow.
const RULES: [(&[&str], Style); 4] = [
    (&["slow", "ballad"], Style::Slow),
    (&["fast", "rock", "metal"], Style::Rock),
    (&["blues"], Style::Blues),
    (&["jazz"], Style::Jazz),
];

#[derive(Clone, Copy, Debug, Default)]
pub struct StyleClassifier;

impl StyleClassifier {
    pub fn classify(&self, description: &str) -> Style {
        let lower = description.to_lowercase();
        RULES
            .iter()
            .find(|(words, _)| words.iter().any(|w| lower.contains(w)))
            .map_or(Style::Custom, |(_, style)| *style)
    }
}

const PROGRESSION: [&str; 4] = ["C", "Am", "F", "G"];
const ROOTS: [&str; 4] = ["C2", "A1", "F2", "G2"];

/// The preset a style maps to: a I-vi-IV-V groove over four bars with the
/// lead left empty and muted for the player.
pub fn pattern_preset(style: Style) -> Preset {
    let bpm = style.bpm();
    Preset::new(
        format!("{} Backing Track", style.label()),
        format!("Generated {} backing track at {bpm} BPM", style.label().to_lowercase()),
        bpm,
    )
    .with_track(TrackKind::Kick, PresetTrack::from_fn(0.6, false, |i| (i % 8 == 0, "C1")))
    .with_track(TrackKind::Snare, PresetTrack::from_fn(0.4, false, |i| (i % 8 == 4, "D2")))
    .with_track(TrackKind::Hihat, PresetTrack::from_fn(0.3, false, |i| (i % 2 == 1, "C3")))
    .with_track(
        TrackKind::Bass,
        PresetTrack::from_fn(0.7, false, |i| (i % 4 == 0, per_bar(i, ROOTS))),
    )
    .with_track(
        TrackKind::Piano,
        PresetTrack::from_fn(0.5, false, |i| (i % 8 == 2 || i % 8 == 6, per_bar(i, PROGRESSION))),
    )
    .with_track(
        TrackKind::Pad,
        PresetTrack::from_fn(0.4, false, |i| (i % 16 == 0, per_bar(i, PROGRESSION))),
    )
    .with_track(TrackKind::Lead, PresetTrack::silent("C4", 0.4, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::STEPS_PER_PATTERN;

    #[test]
    fn slow_wins_over_blues() {
        let style = StyleClassifier.classify("Create a slow blues backing track");
        assert_eq!(style, Style::Slow);
        assert_eq!(style.bpm(), 75);
    }

    #[test]
    fn keywords_in_order() {
        let c = StyleClassifier;
        assert_eq!(c.classify("a power BALLAD"), Style::Slow);
        assert_eq!(c.classify("fast punk"), Style::Rock);
        assert_eq!(c.classify("heavy metal and blues"), Style::Rock);
        assert_eq!(c.classify("delta blues"), Style::Blues);
        assert_eq!(c.classify("smooth jazz"), Style::Jazz);
        assert_eq!(c.classify("something chill"), Style::Custom);
        assert_eq!(c.classify(""), Style::Custom);
    }

    #[test]
    fn pattern_preset_is_complete_and_valid() {
        let preset = pattern_preset(Style::Blues);
        assert_eq!(preset.name, "Blues Backing Track");
        assert_eq!(preset.description, "Generated blues backing track at 100 BPM");
        assert_eq!(preset.tracks.len(), TrackKind::COUNT);
        preset.validate().unwrap();

        let bass = preset.track(TrackKind::Bass).unwrap();
        assert_eq!(bass.steps.len(), STEPS_PER_PATTERN);
        assert_eq!(bass.steps[0].note, "C2");
        assert_eq!(bass.steps[20].note, "A1");
        assert!(bass.steps[4].active && !bass.steps[5].active);

        let hihat = preset.track(TrackKind::Hihat).unwrap();
        assert!(!hihat.steps[0].active && hihat.steps[1].active);

        let lead = preset.track(TrackKind::Lead).unwrap();
        assert!(lead.muted);
        assert!(lead.steps.iter().all(|s| !s.active));
    }
}
