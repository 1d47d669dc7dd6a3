use crossbeam_channel::Receiver;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};

use super::mode::{Mode, PromptKind, TuiState};
use crate::shared::InputEvent;

const VOLUME_STEP: f32 = 0.05;
const MIX_STEP: f32 = 0.1;

// terminal reads block, so they live on their own thread and arrive in the
// main loop's select! like everything else
pub fn spawn_input_thread() -> anyhow::Result<Receiver<Event>> {
    let (tx, rx) = crossbeam_channel::bounded(64);
    std::thread::Builder::new()
        .name("input".to_string())
        .spawn(move || {
            loop {
                match event::read() {
                    Ok(ev) => {
                        if tx.send(ev).is_err() {
                            break; // main loop is gone
                        }
                    }
                    Err(e) => {
                        log::error!(target: "session", "terminal input failed: {e}");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

// resolves a key press into semantic inputevents, tracking cursor and prompt
// state in tuistate along the way
pub fn handle_event(ev: Event, ts: &mut TuiState) -> Vec<InputEvent> {
    match ev {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(key, ts),
        _ => vec![],
    }
}

pub fn handle_key(key: KeyEvent, ts: &mut TuiState) -> Vec<InputEvent> {
    if let Mode::Prompt { kind, text } = &mut ts.mode {
        return match key.code {
            KeyCode::Esc => {
                ts.mode = Mode::Normal;
                vec![]
            }
            KeyCode::Enter => {
                let text = text.trim().to_string();
                let kind = *kind;
                ts.mode = Mode::Normal;
                if text.is_empty() {
                    vec![]
                } else if kind == PromptKind::Describe {
                    vec![InputEvent::Generate(text)]
                } else {
                    vec![InputEvent::VoiceRequest(text)]
                }
            }
            KeyCode::Backspace => {
                text.pop();
                vec![]
            }
            KeyCode::Char(c) => {
                text.push(c);
                vec![]
            }
            _ => vec![],
        };
    }

    let track = ts.cursor_kind();
    let step = ts.cursor_step;
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => vec![InputEvent::Quit],
        KeyCode::Char(' ') => vec![InputEvent::TogglePlay],

        // cursor
        KeyCode::Left | KeyCode::Char('h') => { ts.move_cursor(0, -1); vec![] }
        KeyCode::Right | KeyCode::Char('l') => { ts.move_cursor(0, 1); vec![] }
        KeyCode::Up | KeyCode::Char('k') => { ts.move_cursor(-1, 0); vec![] }
        KeyCode::Down | KeyCode::Char('j') => { ts.move_cursor(1, 0); vec![] }
        KeyCode::Char('H') => { ts.move_cursor(0, -16); vec![] } // a bar at a time
        KeyCode::Char('L') => { ts.move_cursor(0, 16); vec![] }

        // editing at the cursor
        KeyCode::Enter | KeyCode::Char('x') => vec![InputEvent::ToggleStep { track, step }],
        KeyCode::Char(',') => vec![InputEvent::CycleNote { track, step, delta: -1 }],
        KeyCode::Char('.') => vec![InputEvent::CycleNote { track, step, delta: 1 }],
        KeyCode::Char('[') => vec![InputEvent::AdjustVolume { track, delta: -VOLUME_STEP }],
        KeyCode::Char(']') => vec![InputEvent::AdjustVolume { track, delta: VOLUME_STEP }],
        KeyCode::Char('m') => vec![InputEvent::ToggleMute(track)],
        KeyCode::Char('c') => vec![InputEvent::ClearTrack(track)],

        // tempo and mix
        KeyCode::Char('-') => vec![InputEvent::AdjustBpm(-5)],
        KeyCode::Char('=') => vec![InputEvent::AdjustBpm(5)],
        KeyCode::Char('_') => vec![InputEvent::AdjustBpm(-1)],
        KeyCode::Char('+') => vec![InputEvent::AdjustBpm(1)],
        KeyCode::Char('9') => vec![InputEvent::AdjustMasterVolume(-VOLUME_STEP)],
        KeyCode::Char('0') => vec![InputEvent::AdjustMasterVolume(VOLUME_STEP)],

        // presets
        KeyCode::Char(c @ '1'..='3') => vec![InputEvent::LoadBuiltin(c as usize - '1' as usize)],
        KeyCode::Char('s') => vec![InputEvent::SavePreset],
        KeyCode::Char('i') => vec![InputEvent::LoadSavedPreset],
        KeyCode::Char('g') => { ts.open_prompt(PromptKind::Describe); vec![] }
        KeyCode::Char('v') => { ts.open_prompt(PromptKind::Voice); vec![] }

        // guitar
        KeyCode::Char('o') => vec![InputEvent::AdjustReverbMix(-MIX_STEP)],
        KeyCode::Char('p') => vec![InputEvent::AdjustReverbMix(MIX_STEP)],
        KeyCode::Char('r') => vec![InputEvent::ToggleRecording],
        KeyCode::Char('t') => vec![InputEvent::PlayTake],

        KeyCode::Char('?') => { ts.show_help = !ts.show_help; vec![] }
        _ => vec![],
    }
}
