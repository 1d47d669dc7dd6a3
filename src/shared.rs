// Types shared between the session and the front-end.
//
// The TUI never touches session internals. It resolves key presses (plus its
// own cursor/prompt state) into semantic `InputEvent`s for the session, and
// each frame renders whatever `DisplayState` the session hands back.

use crate::audio::ReverbMix;
use crate::pipeline::track::{Step, TrackColor, TrackKind};

pub const STEPS_PER_PATTERN: usize = 64;
pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 240;

#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    Quit,

    // transport
    TogglePlay,
    Stop,
    AdjustBpm(i32),

    // editing, addressed by the cursor the TUI keeps
    ToggleStep { track: TrackKind, step: usize },
    CycleNote { track: TrackKind, step: usize, delta: i32 },
    AdjustVolume { track: TrackKind, delta: f32 },
    ToggleMute(TrackKind),
    ClearTrack(TrackKind),
    AdjustMasterVolume(f32),

    // presets
    LoadBuiltin(usize),
    SavePreset,
    LoadSavedPreset, // next one from the project's presets dir
    Generate(String),  // free-text description
    VoiceRequest(String), // transcribed utterance

    // guitar
    AdjustReverbMix(f32),
    ToggleRecording,
    PlayTake,
}

#[derive(Clone, Debug)]
pub struct TrackRow {
    pub kind: TrackKind,
    pub name: String,
    pub color: TrackColor,
    pub steps: Vec<Step>,
    pub volume: f32,
    pub muted: bool,
}

#[derive(Clone, Debug)]
pub struct DisplayState {
    pub rows: Vec<TrackRow>,
    pub playing_step: Option<usize>,
    pub playing: bool,
    pub bpm: u32,
    pub master_volume: f32,
    pub preset_name: Option<String>,
    pub reverb: ReverbMix,
    pub recording: bool,
    pub last_take: Option<String>, // "take-3.wav  0:12  1.9 MB"
    pub input_level: Option<f32>,  // None when there's no input device
    pub busy: bool,                // a generation request is in flight
    pub status: String,
}
