//! Frame rendering: transcript, status line, input box.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

use parley_core::{LogEntry, Role, TurnState};
use parley_render::{blocks_to_text, render as parse_markdown, DiagramWorker};

use crate::tui::app::App;

pub fn render(app: &mut App, frame: &mut Frame) {
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_transcript(app, frame, areas[0]);
    render_status(app, frame, areas[1]);
    render_input(app, frame, areas[2]);

    if let Some(overlay) = app.overlay.clone() {
        render_overlay(&overlay, frame);
    }
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let entries = app.controller.snapshot();
    let text = transcript_text(&entries, &app.diagrams);

    app.viewport_height = area.height.saturating_sub(2);
    app.content_height = text.lines.len() as u16;

    let title = match app.controller.conversation() {
        Some(summary) => format!(" {} ", summary.title),
        None => " new conversation ".to_string(),
    };

    let widget = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));
    frame.render_widget(widget, area);
}

/// Build the full transcript text from log entries. Separated from the
/// frame for testing.
pub fn transcript_text(entries: &[LogEntry], diagrams: &DiagramWorker) -> Text<'static> {
    let mut text = Text::default();

    for entry in entries {
        let (name, name_style) = match entry.turn.role {
            Role::User => ("you", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Role::Assistant => (
                "assistant",
                Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
            ),
        };
        text.lines.push(Line::from(Span::styled(name, name_style)));

        let blocks = parse_markdown(&entry.turn.content);
        let body = blocks_to_text(&blocks, Some(diagrams));
        text.lines.extend(body.lines);

        match &entry.state {
            TurnState::Streaming => {
                if let Some(last) = text.lines.last_mut() {
                    last.spans.push(Span::styled("▌", Style::default().fg(Color::Magenta)));
                }
            }
            TurnState::Aborted => {
                text.lines.push(Line::from(Span::styled(
                    "[stopped]",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::DIM),
                )));
            }
            TurnState::Failed(message) => {
                text.lines.push(Line::from(Span::styled(
                    format!("[failed: {message}]"),
                    Style::default().fg(Color::Red),
                )));
            }
            TurnState::Final => {}
        }
        text.lines.push(Line::default());
    }

    text
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let status = if app.controller.is_busy() {
        Span::styled(
            " streaming… (Esc to stop)",
            Style::default().fg(Color::Yellow),
        )
    } else if let Some(message) = &app.status {
        Span::styled(format!(" {message}"), Style::default().fg(Color::Yellow))
    } else if let Some(error) = app.controller.last_error() {
        Span::styled(format!(" {error}"), Style::default().fg(Color::Red))
    } else {
        Span::styled(
            " Enter to send, /help for commands",
            Style::default().fg(Color::DarkGray),
        )
    };
    frame.render_widget(Paragraph::new(Line::from(status)), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let width = area.width.saturating_sub(2) as usize;
    let scroll = app.input.visual_scroll(width.max(1));
    let widget = Paragraph::new(app.input.value())
        .scroll((0, scroll as u16))
        .block(Block::default().borders(Borders::ALL).title(" message "));
    frame.render_widget(widget, area);

    let cursor_x = (app.input.visual_cursor().saturating_sub(scroll)) as u16;
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

fn render_overlay(content: &str, frame: &mut Frame) {
    let area = centered(frame.area(), 70, 70);
    frame.render_widget(Clear, area);
    let widget = Paragraph::new(content.to_string())
        .block(Block::default().borders(Borders::ALL).title(" parley "))
        .wrap(Wrap { trim: false });
    frame.render_widget(widget, area);
}

fn centered(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::Turn;
    use parley_render::DiagramBackend;
    use std::sync::Arc;

    struct NoDiagrams;
    #[async_trait]
    impl DiagramBackend for NoDiagrams {
        async fn compile(&self, _source: &str) -> Result<String, parley_core::Error> {
            Ok(String::new())
        }
    }

    fn worker() -> DiagramWorker {
        DiagramWorker::new(Arc::new(NoDiagrams))
    }

    fn plain(text: &Text<'_>) -> String {
        text.lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn test_transcript_shows_roles_and_content() {
        let entries = vec![
            LogEntry {
                turn: Turn::user("Hello"),
                state: TurnState::Final,
            },
            LogEntry {
                turn: Turn::assistant("Hi there"),
                state: TurnState::Final,
            },
        ];
        let text = transcript_text(&entries, &worker());
        let rendered = plain(&text);
        assert!(rendered.contains("you"));
        assert!(rendered.contains("Hello"));
        assert!(rendered.contains("assistant"));
        assert!(rendered.contains("Hi there"));
    }

    #[tokio::test]
    async fn test_streaming_entry_gets_cursor() {
        let entries = vec![LogEntry {
            turn: Turn::assistant("partial"),
            state: TurnState::Streaming,
        }];
        let text = transcript_text(&entries, &worker());
        assert!(plain(&text).contains('▌'));
    }

    #[tokio::test]
    async fn test_aborted_and_failed_markers() {
        let entries = vec![
            LogEntry {
                turn: Turn::assistant("partial "),
                state: TurnState::Aborted,
            },
            LogEntry {
                turn: Turn::assistant("some text"),
                state: TurnState::Failed("connection reset".into()),
            },
        ];
        let text = transcript_text(&entries, &worker());
        let rendered = plain(&text);
        assert!(rendered.contains("[stopped]"));
        assert!(rendered.contains("[failed: connection reset]"));
        // Partial content stays visible in both cases.
        assert!(rendered.contains("partial"));
        assert!(rendered.contains("some text"));
    }
}
