//! Render tree → ratatui `Text` for the transcript view.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use unicode_width::UnicodeWidthStr;

use crate::diagram::{DiagramState, DiagramWorker};
use crate::highlight::{highlight_code, plain_lines};
use crate::tree::{Block, FenceKind, Inline};

/// Convert a block tree into terminal text. When a diagram worker is given,
/// closed diagram fences are submitted to it and drawn according to their
/// current state; without one they render as plain fences.
pub fn blocks_to_text(blocks: &[Block], diagrams: Option<&DiagramWorker>) -> Text<'static> {
    let mut renderer = Renderer {
        lines: Vec::new(),
        diagrams,
    };
    renderer.render_blocks(blocks, "");
    Text::from(renderer.lines)
}

struct Renderer<'a> {
    lines: Vec<Line<'static>>,
    diagrams: Option<&'a DiagramWorker>,
}

impl Renderer<'_> {
    fn render_blocks(&mut self, blocks: &[Block], indent: &str) {
        for (i, block) in blocks.iter().enumerate() {
            if i > 0 {
                self.push_line(indent, Vec::new());
            }
            self.render_block(block, indent);
        }
    }

    fn render_block(&mut self, block: &Block, indent: &str) {
        match block {
            Block::Paragraph(inlines) => {
                for spans in inline_lines(inlines, Style::default()) {
                    self.push_line(indent, spans);
                }
            }
            Block::Heading { level, content } => {
                let style = heading_style(*level);
                let prefix = "#".repeat(*level as usize);
                for mut spans in inline_lines(content, style) {
                    spans.insert(0, Span::styled(format!("{prefix} "), style));
                    self.push_line(indent, spans);
                }
            }
            Block::CodeFence { kind, text, closed } => {
                self.render_fence(kind, text, *closed, indent);
            }
            Block::List { start, items } => {
                for (i, item) in items.iter().enumerate() {
                    let marker = match start {
                        Some(n) => format!("{}. ", n + i as u64),
                        None => "• ".to_string(),
                    };
                    let hanging =
                        format!("{indent}{}", " ".repeat(UnicodeWidthStr::width(marker.as_str())));
                    let first = self.lines.len();
                    self.render_blocks(item, &hanging);
                    // Replace the hanging indent with the marker on the
                    // item's first line.
                    if let Some(line) = self.lines.get_mut(first) {
                        let mut spans = vec![
                            Span::raw(indent.to_string()),
                            Span::styled(marker, Style::default().fg(Color::Cyan)),
                        ];
                        spans.extend(line.spans.drain(..).skip(1));
                        *line = Line::from(spans);
                    }
                }
            }
            Block::BlockQuote(inner) => {
                let first = self.lines.len();
                self.render_blocks(inner, indent);
                for line in self.lines.iter_mut().skip(first) {
                    let mut spans =
                        vec![Span::styled("│ ", Style::default().fg(Color::Green))];
                    spans.extend(line.spans.drain(..));
                    *line = Line::from(spans);
                }
            }
            Block::Rule => {
                self.push_line(
                    indent,
                    vec![Span::styled(
                        "─".repeat(40),
                        Style::default().fg(Color::DarkGray),
                    )],
                );
            }
        }
    }

    fn render_fence(&mut self, kind: &FenceKind, text: &str, closed: bool, indent: &str) {
        let label = kind.label();
        let header = if label.is_empty() {
            "───".to_string()
        } else {
            format!("─── {label}")
        };
        self.push_line(
            indent,
            vec![Span::styled(header, Style::default().fg(Color::DarkGray))],
        );

        match kind {
            FenceKind::Diagram if closed => self.render_diagram(text, indent),
            FenceKind::Diagram => {
                // Still streaming in; show the source dimmed, do not compile.
                self.push_code(plain_lines(text), dim(), indent);
            }
            FenceKind::Code(lang) if closed => {
                self.push_code(highlight_code(text, lang), Style::default(), indent);
            }
            FenceKind::Code(_) => {
                self.push_code(plain_lines(text), dim(), indent);
            }
            FenceKind::Plain => {
                let style = if closed { Style::default() } else { dim() };
                self.push_code(plain_lines(text), style, indent);
            }
        }

        if closed {
            self.push_line(
                indent,
                vec![Span::styled("───", Style::default().fg(Color::DarkGray))],
            );
        }
    }

    fn render_diagram(&mut self, source: &str, indent: &str) {
        let state = match self.diagrams {
            Some(worker) => {
                worker.submit(source);
                worker.lookup(source)
            }
            None => None,
        };
        match state {
            Some(DiagramState::Ready(_)) => {
                self.push_line(
                    indent,
                    vec![Span::styled(
                        "◆ diagram rendered",
                        Style::default().fg(Color::Green),
                    )],
                );
                self.push_code(plain_lines(source), dim(), indent);
            }
            Some(DiagramState::Failed(message)) => {
                self.push_line(
                    indent,
                    vec![Span::styled(
                        format!("✗ diagram failed: {message}"),
                        Style::default().fg(Color::Red),
                    )],
                );
                self.push_code(plain_lines(source), dim(), indent);
            }
            Some(DiagramState::Pending) => {
                self.push_line(
                    indent,
                    vec![Span::styled("… rendering diagram", dim())],
                );
                self.push_code(plain_lines(source), dim(), indent);
            }
            None => {
                self.push_code(plain_lines(source), dim(), indent);
            }
        }
    }

    fn push_code(&mut self, lines: Vec<Line<'static>>, extra: Style, indent: &str) {
        for line in lines {
            let spans: Vec<Span<'static>> = line
                .spans
                .into_iter()
                .map(|span| {
                    let style = span.style.patch(extra);
                    Span::styled(span.content, style)
                })
                .collect();
            self.push_line(indent, spans);
        }
    }

    fn push_line(&mut self, indent: &str, mut spans: Vec<Span<'static>>) {
        let mut line = vec![Span::raw(indent.to_string())];
        line.append(&mut spans);
        self.lines.push(Line::from(line));
    }
}

fn dim() -> Style {
    Style::default().add_modifier(Modifier::DIM)
}

fn heading_style(level: u8) -> Style {
    let style = Style::default().add_modifier(Modifier::BOLD);
    match level {
        1 => style.fg(Color::Magenta).add_modifier(Modifier::UNDERLINED),
        2 => style.fg(Color::Magenta),
        _ => style.fg(Color::Blue),
    }
}

/// Flatten inlines into lines of styled spans, splitting on hard breaks.
fn inline_lines(inlines: &[Inline], base: Style) -> Vec<Vec<Span<'static>>> {
    let mut lines = vec![Vec::new()];
    push_inlines(inlines, base, &mut lines);
    lines
}

fn push_inlines(inlines: &[Inline], style: Style, lines: &mut Vec<Vec<Span<'static>>>) {
    for inline in inlines {
        match inline {
            Inline::Text(text) => {
                if let Some(current) = lines.last_mut() {
                    current.push(Span::styled(text.clone(), style));
                }
            }
            Inline::Code(text) => {
                if let Some(current) = lines.last_mut() {
                    current.push(Span::styled(
                        text.clone(),
                        style.fg(Color::Yellow),
                    ));
                }
            }
            Inline::Emphasis(children) => {
                push_inlines(children, style.add_modifier(Modifier::ITALIC), lines);
            }
            Inline::Strong(children) => {
                push_inlines(children, style.add_modifier(Modifier::BOLD), lines);
            }
            Inline::Strikethrough(children) => {
                push_inlines(children, style.add_modifier(Modifier::CROSSED_OUT), lines);
            }
            Inline::Link { url, children } => {
                let link_style = style.fg(Color::Blue).add_modifier(Modifier::UNDERLINED);
                push_inlines(children, link_style, lines);
                let text: String = children.iter().map(Inline::plain_text).collect();
                if text != *url {
                    if let Some(current) = lines.last_mut() {
                        current.push(Span::styled(
                            format!(" ({url})"),
                            Style::default().fg(Color::DarkGray),
                        ));
                    }
                }
            }
            Inline::HardBreak => lines.push(Vec::new()),
        }
    }
}
