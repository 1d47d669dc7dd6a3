// Track definitions: the closed set of instruments the sequencer knows about,
// plus the per-step and per-track data the session edits.

use serde::{Deserialize, Serialize};

use crate::shared::STEPS_PER_PATTERN;

const DRUM_PALETTE: [&str; 15] = [
    "C1", "D1", "E1", "F1", "G1", "A1", "B1", "C2", "D2", "E2", "F2", "G2", "A2", "B2", "C3",
];
const CHORD_PALETTE: [&str; 8] = ["C", "Dm", "Em", "F", "G", "Am", "Bdim", "C5"];
const LEAD_PALETTE: [&str; 15] = [
    "C4", "D4", "E4", "F4", "G4", "A4", "B4", "C5", "D5", "E5", "F5", "G5", "A5", "B5", "C6",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Kick,
    Snare,
    Hihat,
    Bass,
    Piano,
    Pad,
    Lead,
}

impl TrackKind {
    pub const COUNT: usize = 7;
    pub const ALL: [TrackKind; Self::COUNT] = [
        TrackKind::Kick,
        TrackKind::Snare,
        TrackKind::Hihat,
        TrackKind::Bass,
        TrackKind::Piano,
        TrackKind::Pad,
        TrackKind::Lead,
    ];

    /// Dense index, used for fixed-size per-instrument arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The string id used in preset JSON.
    pub fn id(self) -> &'static str {
        match self {
            TrackKind::Kick => "kick",
            TrackKind::Snare => "snare",
            TrackKind::Hihat => "hihat",
            TrackKind::Bass => "bass",
            TrackKind::Piano => "piano",
            TrackKind::Pad => "pad",
            TrackKind::Lead => "lead",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            TrackKind::Kick => "Kick",
            TrackKind::Snare => "Snare",
            TrackKind::Hihat => "Hi-Hat",
            TrackKind::Bass => "Bass",
            TrackKind::Piano => "Piano",
            TrackKind::Pad => "Pad",
            TrackKind::Lead => "Lead",
        }
    }

    pub fn color(self) -> TrackColor {
        match self {
            TrackKind::Kick => TrackColor::Red,
            TrackKind::Snare => TrackColor::Orange,
            TrackKind::Hihat => TrackColor::Yellow,
            TrackKind::Bass => TrackColor::Blue,
            TrackKind::Piano => TrackColor::Purple,
            TrackKind::Pad => TrackColor::Green,
            TrackKind::Lead => TrackColor::Pink,
        }
    }

    pub fn default_note(self) -> &'static str {
        match self {
            TrackKind::Kick => "C1",
            TrackKind::Snare => "D2",
            TrackKind::Hihat => "C3",
            TrackKind::Bass => "E2",
            TrackKind::Piano | TrackKind::Pad => "C",
            TrackKind::Lead => "C4",
        }
    }

    pub fn default_volume(self) -> f32 {
        match self {
            TrackKind::Kick => 0.8,
            TrackKind::Snare => 0.6,
            TrackKind::Hihat => 0.4,
            TrackKind::Bass => 0.6,
            TrackKind::Piano => 0.5,
            TrackKind::Pad => 0.4,
            TrackKind::Lead => 0.4,
        }
    }

    /// Notes (or chord symbols) offered when cycling a step's note.
    pub fn palette(self) -> &'static [&'static str] {
        match self {
            TrackKind::Kick => &DRUM_PALETTE[..12],
            TrackKind::Snare | TrackKind::Hihat | TrackKind::Bass => &DRUM_PALETTE,
            TrackKind::Piano | TrackKind::Pad => &CHORD_PALETTE,
            TrackKind::Lead => &LEAD_PALETTE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackColor {
    Red,
    Orange,
    Yellow,
    Blue,
    Purple,
    Green,
    Pink,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub active: bool,
    pub note: String, // pitch name ("C1") or chord symbol ("Am"), depending on the track
}

impl Step {
    pub fn new(active: bool, note: impl Into<String>) -> Self {
        Self { active, note: note.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub kind: TrackKind,
    pub name: String,
    pub steps: Vec<Step>, // always STEPS_PER_PATTERN long
    pub volume: f32,
    pub muted: bool,
    pub color: TrackColor,
}

impl Track {
    /// An empty track: every step off, every note the kind's default.
    pub fn new(kind: TrackKind) -> Self {
        Self {
            kind,
            name: kind.name().to_string(),
            steps: vec![Step::new(false, kind.default_note()); STEPS_PER_PATTERN],
            volume: kind.default_volume(),
            muted: false,
            color: kind.color(),
        }
    }

    /// The pattern a fresh session starts with: a plain rock beat on the drums,
    /// melodic tracks left empty for the player to fill.
    pub fn with_default_pattern(kind: TrackKind) -> Self {
        let mut track = Self::new(kind);
        for (i, step) in track.steps.iter_mut().enumerate() {
            step.active = match kind {
                TrackKind::Kick => i % 8 == 0,
                TrackKind::Snare => i % 8 == 4,
                TrackKind::Hihat => i % 2 == 0,
                _ => false,
            };
        }
        track
    }

    pub fn id(&self) -> &'static str {
        self.kind.id()
    }

    pub fn active_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.active).count()
    }
}
