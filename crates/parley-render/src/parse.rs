//! Markdown → render tree.
//!
//! `render` is a pure function of the raw text: identical input yields a
//! structurally identical tree, and partial input (the common case while a
//! reply is streaming) never errors. An unterminated fence becomes an
//! in-progress `CodeFence`; unterminated inline markers degrade to literal
//! text via the parser itself.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::tree::{Block, FenceKind, Inline};

/// Render raw (possibly partial) Markdown into a block tree.
pub fn render(raw: &str) -> Vec<Block> {
    let options = Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(raw, options);

    let mut builder = Builder::new();
    for event in parser {
        builder.push(event);
    }
    let mut blocks = builder.finish();

    // The event stream closes every fence at EOF; recover the in-progress
    // flag from the source itself.
    if ends_inside_fence(raw) {
        mark_last_fence_open(&mut blocks);
    }
    blocks
}

enum Frame {
    Blocks(Vec<Block>),
    List {
        start: Option<u64>,
        items: Vec<Vec<Block>>,
    },
}

enum Wrap {
    Emphasis,
    Strong,
    Strikethrough,
    Link(String),
}

struct Builder {
    frames: Vec<Frame>,
    inlines: Vec<Inline>,
    wraps: Vec<(Wrap, Vec<Inline>)>,
    code: Option<(FenceKind, String)>,
}

impl Builder {
    fn new() -> Self {
        Self {
            frames: vec![Frame::Blocks(Vec::new())],
            inlines: Vec::new(),
            wraps: Vec::new(),
            code: None,
        }
    }

    fn push(&mut self, event: Event<'_>) {
        match event {
            Event::Start(Tag::Paragraph) => {}
            Event::End(TagEnd::Paragraph) => self.flush_paragraph(),

            Event::Start(Tag::Heading { .. }) => self.flush_inline_remainder(),
            Event::End(TagEnd::Heading(level)) => {
                let content = std::mem::take(&mut self.inlines);
                self.emit(Block::Heading {
                    level: heading_level(level),
                    content,
                });
            }

            Event::Start(Tag::CodeBlock(kind)) => {
                self.flush_inline_remainder();
                let fence = match kind {
                    CodeBlockKind::Fenced(info) => FenceKind::classify(&info),
                    CodeBlockKind::Indented => FenceKind::Plain,
                };
                self.code = Some((fence, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((kind, text)) = self.code.take() {
                    self.emit(Block::CodeFence {
                        kind,
                        text,
                        closed: true,
                    });
                }
            }

            Event::Start(Tag::BlockQuote(_)) => {
                self.flush_paragraph();
                self.frames.push(Frame::Blocks(Vec::new()));
            }
            Event::End(TagEnd::BlockQuote(_)) => {
                self.flush_paragraph();
                if let Some(Frame::Blocks(blocks)) = self.frames.pop() {
                    self.emit(Block::BlockQuote(blocks));
                }
            }

            Event::Start(Tag::List(start)) => {
                self.flush_paragraph();
                self.frames.push(Frame::List {
                    start,
                    items: Vec::new(),
                });
            }
            Event::End(TagEnd::List(_)) => {
                if let Some(Frame::List { start, items }) = self.frames.pop() {
                    self.emit(Block::List { start, items });
                }
            }
            Event::Start(Tag::Item) => {
                self.frames.push(Frame::Blocks(Vec::new()));
            }
            Event::End(TagEnd::Item) => {
                self.flush_paragraph();
                if let Some(Frame::Blocks(blocks)) = self.frames.pop() {
                    if let Some(Frame::List { items, .. }) = self.frames.last_mut() {
                        items.push(blocks);
                    }
                }
            }

            Event::Rule => {
                self.flush_paragraph();
                self.emit(Block::Rule);
            }

            Event::Start(Tag::Emphasis) => self.open_wrap(Wrap::Emphasis),
            Event::End(TagEnd::Emphasis) => self.close_wrap(),
            Event::Start(Tag::Strong) => self.open_wrap(Wrap::Strong),
            Event::End(TagEnd::Strong) => self.close_wrap(),
            Event::Start(Tag::Strikethrough) => self.open_wrap(Wrap::Strikethrough),
            Event::End(TagEnd::Strikethrough) => self.close_wrap(),
            Event::Start(Tag::Link { dest_url, .. }) | Event::Start(Tag::Image { dest_url, .. }) => {
                self.open_wrap(Wrap::Link(dest_url.to_string()));
            }
            Event::End(TagEnd::Link) | Event::End(TagEnd::Image) => self.close_wrap(),

            Event::Text(text) => {
                if let Some((_, code)) = self.code.as_mut() {
                    code.push_str(&text);
                } else {
                    self.inlines.push(Inline::Text(text.to_string()));
                }
            }
            Event::Code(text) => self.inlines.push(Inline::Code(text.to_string())),
            Event::SoftBreak => self.inlines.push(Inline::Text(" ".to_string())),
            Event::HardBreak => self.inlines.push(Inline::HardBreak),

            // Raw HTML is shown literally rather than interpreted.
            Event::Html(html) | Event::InlineHtml(html) => {
                self.inlines.push(Inline::Text(html.to_string()));
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.inlines.push(Inline::Text(marker.to_string()));
            }

            _ => {}
        }
    }

    fn finish(mut self) -> Vec<Block> {
        // Partial input can leave an open paragraph or code accumulator.
        if let Some((kind, text)) = self.code.take() {
            self.emit(Block::CodeFence {
                kind,
                text,
                closed: true,
            });
        }
        self.flush_paragraph();
        loop {
            match self.frames.pop() {
                Some(Frame::Blocks(blocks)) if self.frames.is_empty() => return blocks,
                Some(Frame::Blocks(blocks)) => self.emit(Block::BlockQuote(blocks)),
                Some(Frame::List { start, items }) => self.emit(Block::List { start, items }),
                None => return Vec::new(),
            }
        }
    }

    fn emit(&mut self, block: Block) {
        match self.frames.last_mut() {
            Some(Frame::Blocks(blocks)) => blocks.push(block),
            Some(Frame::List { items, .. }) => {
                // A block outside any item inside a list should not happen,
                // but partial input is full of should-not-happens.
                items.push(vec![block]);
            }
            None => self.frames.push(Frame::Blocks(vec![block])),
        }
    }

    fn open_wrap(&mut self, wrap: Wrap) {
        let saved = std::mem::take(&mut self.inlines);
        self.wraps.push((wrap, saved));
    }

    fn close_wrap(&mut self) {
        if let Some((wrap, saved)) = self.wraps.pop() {
            let children = std::mem::replace(&mut self.inlines, saved);
            let inline = match wrap {
                Wrap::Emphasis => Inline::Emphasis(children),
                Wrap::Strong => Inline::Strong(children),
                Wrap::Strikethrough => Inline::Strikethrough(children),
                Wrap::Link(url) => Inline::Link { url, children },
            };
            self.inlines.push(inline);
        }
    }

    /// Collapse any open wrappers and flush accumulated inlines as a
    /// paragraph. Used at paragraph/item ends and at EOF.
    fn flush_paragraph(&mut self) {
        self.flush_inline_remainder();
        if self.inlines.is_empty() {
            return;
        }
        let inlines = std::mem::take(&mut self.inlines);
        self.emit(Block::Paragraph(inlines));
    }

    fn flush_inline_remainder(&mut self) {
        while !self.wraps.is_empty() {
            self.close_wrap();
        }
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Does the source end inside an unterminated fenced block?
///
/// Tracks fence open/close line by line the way the fence grammar does:
/// a close requires the same fence character and at least as many of them.
fn ends_inside_fence(raw: &str) -> bool {
    let mut open: Option<(char, usize)> = None;

    for line in raw.lines() {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        if indent > 3 {
            continue;
        }
        let fence_char = match trimmed.chars().next() {
            Some(c @ ('`' | '~')) => c,
            _ => continue,
        };
        let count = trimmed.chars().take_while(|&c| c == fence_char).count();
        if count < 3 {
            continue;
        }
        match open {
            None => open = Some((fence_char, count)),
            Some((open_char, open_count)) => {
                let rest = trimmed[count..].trim();
                if fence_char == open_char && count >= open_count && rest.is_empty() {
                    open = None;
                }
            }
        }
    }

    open.is_some()
}

/// Flip the document-order-last code fence to in-progress.
fn mark_last_fence_open(blocks: &mut [Block]) -> bool {
    for block in blocks.iter_mut().rev() {
        match block {
            Block::CodeFence { closed, .. } => {
                *closed = false;
                return true;
            }
            Block::BlockQuote(inner) => {
                if mark_last_fence_open(inner) {
                    return true;
                }
            }
            Block::List { items, .. } => {
                for item in items.iter_mut().rev() {
                    if mark_last_fence_open(item) {
                        return true;
                    }
                }
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_paragraph() {
        let tree = render("Hello world");
        assert_eq!(
            tree,
            vec![Block::Paragraph(vec![Inline::Text("Hello world".into())])]
        );
    }

    #[test]
    fn test_render_is_pure() {
        let input = "# Title\n\nSome *emphasis* and `code`.\n\n```rust\nlet x = 1;\n```\n";
        assert_eq!(render(input), render(input));
    }

    #[test]
    fn test_completed_fence() {
        let tree = render("```js\nconsole.log(1)\n```");
        assert_eq!(
            tree,
            vec![Block::CodeFence {
                kind: FenceKind::Code("js".into()),
                text: "console.log(1)\n".into(),
                closed: true,
            }]
        );
    }

    #[test]
    fn test_unterminated_fence_is_in_progress() {
        let tree = render("```js\nconsole.log(1)");
        match &tree[..] {
            [Block::CodeFence { kind, text, closed }] => {
                assert_eq!(*kind, FenceKind::Code("js".into()));
                assert!(text.starts_with("console.log(1)"));
                assert!(!closed);
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_fence_converges_across_fragments() {
        // The streaming scenario: the fence arrives in two fragments.
        let partial = render("```js\nconsole.log(1)");
        let full = render("```js\nconsole.log(1)\n```");

        let (partial_fence, full_fence) = match (&partial[..], &full[..]) {
            ([p], [f]) => (p, f),
            other => panic!("unexpected trees: {other:?}"),
        };
        match (partial_fence, full_fence) {
            (
                Block::CodeFence { kind: pk, closed: pc, .. },
                Block::CodeFence { kind: fk, text, closed: fc },
            ) => {
                assert_eq!(pk, fk);
                assert!(!pc);
                assert!(fc);
                assert_eq!(text, "console.log(1)\n");
            }
            other => panic!("unexpected blocks: {other:?}"),
        }
    }

    #[test]
    fn test_fence_without_info_string_is_plain() {
        let tree = render("```\nraw text");
        match &tree[..] {
            [Block::CodeFence { kind, closed, .. }] => {
                assert_eq!(*kind, FenceKind::Plain);
                assert!(!closed);
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_emphasis_is_literal() {
        let tree = render("this *never closes");
        match &tree[..] {
            [Block::Paragraph(inlines)] => {
                // The lone star stays literal text, not an emphasis wrapper.
                assert!(inlines.iter().all(|i| matches!(i, Inline::Text(_))));
                let flat: String = inlines.iter().map(Inline::plain_text).collect();
                assert_eq!(flat, "this *never closes");
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_prefixes_never_panic() {
        let doc = "# Head\n\n> quote with *em*\n\n- one\n- `two`\n\n```mermaid\ngraph TD;\nA-->B;\n```\n\n[link](http://x) done.\n";
        for (i, _) in doc.char_indices() {
            let _ = render(&doc[..i]);
        }
        // And the full document converges to itself.
        assert_eq!(render(doc), render(doc));
    }

    #[test]
    fn test_heading_levels() {
        let tree = render("## Section");
        assert_eq!(
            tree,
            vec![Block::Heading {
                level: 2,
                content: vec![Inline::Text("Section".into())],
            }]
        );
    }

    #[test]
    fn test_nested_inline_styles() {
        let tree = render("**bold *both***");
        assert_eq!(
            tree,
            vec![Block::Paragraph(vec![Inline::Strong(vec![
                Inline::Text("bold ".into()),
                Inline::Emphasis(vec![Inline::Text("both".into())]),
            ])])]
        );
    }

    #[test]
    fn test_list_items() {
        let tree = render("- one\n- two");
        match &tree[..] {
            [Block::List { start: None, items }] => {
                assert_eq!(items.len(), 2);
                assert_eq!(
                    items[0],
                    vec![Block::Paragraph(vec![Inline::Text("one".into())])]
                );
            }
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_ordered_list_start() {
        let tree = render("3. three\n4. four");
        match &tree[..] {
            [Block::List { start: Some(3), items }] => assert_eq!(items.len(), 2),
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_blockquote_nesting() {
        let tree = render("> quoted text");
        assert_eq!(
            tree,
            vec![Block::BlockQuote(vec![Block::Paragraph(vec![Inline::Text(
                "quoted text".into()
            )])])]
        );
    }

    #[test]
    fn test_diagram_fence_classified() {
        let tree = render("```mermaid\ngraph TD;\n```");
        match &tree[..] {
            [Block::CodeFence { kind, .. }] => assert_eq!(*kind, FenceKind::Diagram),
            other => panic!("unexpected tree: {other:?}"),
        }
    }

    #[test]
    fn test_unclosed_fence_inside_list() {
        let tree = render("- item\n\n  ```py\n  x = 1");
        fn has_open_fence(blocks: &[Block]) -> bool {
            blocks.iter().any(|b| match b {
                Block::CodeFence { closed, .. } => !closed,
                Block::List { items, .. } => items.iter().any(|i| has_open_fence(i)),
                Block::BlockQuote(inner) => has_open_fence(inner),
                _ => false,
            })
        }
        assert!(has_open_fence(&tree));
    }

    #[test]
    fn test_link() {
        let tree = render("[here](http://example.com)");
        assert_eq!(
            tree,
            vec![Block::Paragraph(vec![Inline::Link {
                url: "http://example.com".into(),
                children: vec![Inline::Text("here".into())],
            }])]
        );
    }

    #[test]
    fn test_rule() {
        let tree = render("above\n\n---\n\nbelow");
        assert_eq!(tree.len(), 3);
        assert_eq!(tree[1], Block::Rule);
    }

    #[test]
    fn test_tilde_fence_not_closed_by_backticks() {
        assert!(ends_inside_fence("~~~\ncode\n```"));
        assert!(!ends_inside_fence("~~~\ncode\n~~~"));
    }

    #[test]
    fn test_fence_close_needs_enough_chars() {
        assert!(ends_inside_fence("````\ncode\n```"));
        assert!(!ends_inside_fence("```\ncode\n````"));
    }

    #[test]
    fn test_empty_input() {
        assert!(render("").is_empty());
    }
}
