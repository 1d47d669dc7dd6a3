use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};
use ratatui::Frame;

use crate::pipeline::track::TrackColor;
use crate::shared::{DisplayState, TrackRow};

const NAME_WIDTH: usize = 8;

pub fn track_color(color: TrackColor) -> Color {
    match color {
        TrackColor::Red => Color::Red,
        TrackColor::Orange => Color::Rgb(255, 140, 0),
        TrackColor::Yellow => Color::Yellow,
        TrackColor::Blue => Color::Blue,
        TrackColor::Purple => Color::Magenta,
        TrackColor::Green => Color::Green,
        TrackColor::Pink => Color::LightMagenta,
    }
}

// one cell per step, a gap between bars of four beats
fn step_spans(
    row: &TrackRow,
    row_idx: usize,
    state: &DisplayState,
    cursor: (usize, usize),
) -> Vec<Span<'static>> {
    let base = if row.muted { Color::DarkGray } else { track_color(row.color) };
    let mut spans = Vec::with_capacity(row.steps.len() + row.steps.len() / 4);
    for (i, step) in row.steps.iter().enumerate() {
        if i > 0 && i % 4 == 0 {
            spans.push(Span::raw(if i % 16 == 0 { "│" } else { " " }));
        }
        let mut style = if step.active {
            Style::default().fg(base)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        if state.playing_step == Some(i) {
            style = style.bg(Color::Gray);
        }
        if cursor == (row_idx, i) {
            style = style.add_modifier(Modifier::REVERSED);
        }
        spans.push(Span::styled(if step.active { "●" } else { "·" }, style));
    }
    spans
}

pub fn draw_step_grid(frame: &mut Frame, area: Rect, state: &DisplayState, cursor: (usize, usize)) {
    let lines: Vec<Line> = state
        .rows
        .iter()
        .enumerate()
        .map(|(row_idx, row)| {
            let mut name_style = Style::default().fg(track_color(row.color));
            if row.muted {
                name_style = name_style.fg(Color::DarkGray).add_modifier(Modifier::CROSSED_OUT);
            }
            if cursor.0 == row_idx {
                name_style = name_style.add_modifier(Modifier::BOLD);
            }
            let mut spans = vec![Span::styled(format!("{:<NAME_WIDTH$}", row.name), name_style)];
            spans.push(Span::raw(format!("{:>3.0}% ", row.volume * 100.0)));
            spans.extend(step_spans(row, row_idx, state, cursor));
            Line::from(spans)
        })
        .collect();

    let block = Block::bordered().title(" Sequencer ");
    frame.render_widget(Paragraph::new(lines).block(block), area);
}
