use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph, Sparkline};
use ratatui::Frame;

use super::grid::draw_step_grid;
use super::mode::{Mode, TuiState};
use crate::shared::DisplayState;

const HELP: &str = "space play/stop  arrows/hjkl move  enter toggle  ,/. note  [/] vol  \
                    m mute  c clear  -/= bpm  9/0 master  1-3 presets  s save  i saved  \
                    g describe  v voice  o/p reverb  r rec  t take  q quit";

pub fn render(frame: &mut Frame, area: Rect, state: &DisplayState, ts: &TuiState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // transport header
            Constraint::Length(10), // step grid (7 rows + border + note line)
            Constraint::Length(6),  // guitar panel
            Constraint::Length(3),  // status or prompt
            Constraint::Min(0),
        ])
        .split(area);

    draw_header(frame, sections[0], state);
    draw_step_grid(frame, sections[1], state, (ts.cursor_track, ts.cursor_step));
    draw_guitar(frame, sections[2], state, ts);
    draw_status(frame, sections[3], state, ts);
    if ts.show_help {
        frame.render_widget(
            Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
            sections[4],
        );
    }
}

fn draw_header(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let play = if state.playing {
        Span::styled("▶ PLAY", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
    } else {
        Span::styled("■ STOP", Style::default().fg(Color::DarkGray))
    };
    let step = state
        .playing_step
        .map_or_else(|| "--".to_string(), |s| format!("{:02}", s + 1));
    let line = Line::from(vec![
        play,
        Span::raw(format!(
            "   {} BPM   step {step}   master {:.0}%",
            state.bpm,
            state.master_volume * 100.0
        )),
        Span::styled(
            format!("   {}", state.preset_name.as_deref().unwrap_or("(default pattern)")),
            Style::default().fg(Color::Cyan),
        ),
    ]);
    frame.render_widget(Paragraph::new(line).block(Block::bordered().title(" backtrack ")), area);
}

fn draw_guitar(frame: &mut Frame, area: Rect, state: &DisplayState, ts: &TuiState) {
    let block = Block::bordered().title(" Guitar ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(inner);

    let rec = if state.recording {
        Span::styled("● REC ", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))
    } else {
        Span::raw("      ")
    };
    let info = Line::from(vec![
        rec,
        Span::raw(format!(
            "dry {:.0}%  wet {:.0}%   {}",
            state.reverb.dry * 100.0,
            state.reverb.wet * 100.0,
            state.last_take.as_deref().unwrap_or("no takes yet"),
        )),
    ]);
    frame.render_widget(Paragraph::new(info), rows[0]);

    match state.input_level {
        Some(level) => {
            let cols = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Length(12), Constraint::Min(0)])
                .split(rows[1]);
            let label = format!("input {:>3.0}%", level.clamp(0.0, 1.0) * 100.0);
            frame.render_widget(Paragraph::new(label), cols[0]);

            let width = cols[1].width as usize;
            let skip = ts.input_history.len().saturating_sub(width);
            let trace: Vec<u64> = ts.input_history.iter().skip(skip).copied().collect();
            let sparkline = Sparkline::default()
                .data(trace)
                .max(100)
                .style(Style::default().fg(Color::Green));
            frame.render_widget(sparkline, cols[1]);
        }
        None => frame.render_widget(
            Paragraph::new("no input device").style(Style::default().fg(Color::DarkGray)),
            rows[1],
        ),
    }
}

fn draw_status(frame: &mut Frame, area: Rect, state: &DisplayState, ts: &TuiState) {
    let (title, text) = match &ts.mode {
        Mode::Prompt { kind, text } => (format!(" {} ", kind.label()), format!("{text}▏")),
        Mode::Normal => {
            let busy = if state.busy { "working… " } else { "" };
            let cursor_note = state
                .rows
                .get(ts.cursor_track)
                .and_then(|r| r.steps.get(ts.cursor_step))
                .map(|s| s.note.as_str())
                .unwrap_or("");
            (
                format!(" step {} note {cursor_note} ", ts.cursor_step + 1),
                format!("{busy}{}", state.status),
            )
        }
    };
    frame.render_widget(Paragraph::new(text).block(Block::bordered().title(title)), area);
}
