use std::collections::VecDeque;

use crate::pipeline::track::TrackKind;
use crate::shared::STEPS_PER_PATTERN;

// state local to the tui: where the cursor is and whether a text prompt is open.
// the session never sees any of this, only the InputEvents it resolves to
#[derive(Clone, Debug, PartialEq)]
pub enum Mode {
    Normal,
    Prompt { kind: PromptKind, text: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptKind {
    Describe, // free-text description for the generator
    Voice,    // typed stand-in for a transcribed utterance
}

impl PromptKind {
    pub fn label(self) -> &'static str {
        match self {
            PromptKind::Describe => "Describe a backing track",
            PromptKind::Voice => "Ask the agent",
        }
    }
}

const LEVEL_HISTORY: usize = 256;

#[derive(Clone, Debug)]
pub struct TuiState {
    pub cursor_track: usize, // row, index into TrackKind::ALL
    pub cursor_step: usize,
    pub mode: Mode,
    pub show_help: bool,
    pub input_history: VecDeque<u64>, // input peaks in percent, newest last
}

impl Default for TuiState {
    fn default() -> Self {
        Self {
            cursor_track: 0,
            cursor_step: 0,
            mode: Mode::Normal,
            show_help: false,
            input_history: VecDeque::with_capacity(LEVEL_HISTORY),
        }
    }
}

impl TuiState {
    pub fn cursor_kind(&self) -> TrackKind {
        TrackKind::ALL[self.cursor_track.min(TrackKind::COUNT - 1)]
    }

    // rows clamp, steps wrap around the pattern
    pub fn move_cursor(&mut self, tracks: i32, steps: i32) {
        let row = self.cursor_track as i32 + tracks;
        self.cursor_track = row.clamp(0, TrackKind::COUNT as i32 - 1) as usize;
        let col = self.cursor_step as i32 + steps;
        self.cursor_step = col.rem_euclid(STEPS_PER_PATTERN as i32) as usize;
    }

    pub fn open_prompt(&mut self, kind: PromptKind) {
        self.mode = Mode::Prompt { kind, text: String::new() };
    }

    /// Sampled once per frame to draw the input trace.
    pub fn record_level(&mut self, level: f32) {
        if self.input_history.len() == LEVEL_HISTORY {
            self.input_history.pop_front();
        }
        let percent = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) * 100.0 };
        self.input_history.push_back(percent.round() as u64);
    }
}
