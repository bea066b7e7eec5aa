//! The structured render tree: pure derived data, recomputed from a turn's
//! raw text on every change, never mutated in place.

/// The reserved fenced-block language identifier for diagrams.
pub const DIAGRAM_TAG: &str = "mermaid";

/// Classification of a fence info string. A closed set so dispatch over
/// fence kinds is total.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FenceKind {
    /// The reserved diagram tag; routed to the diagram compiler.
    Diagram,
    /// A language tag for syntax highlighting.
    Code(String),
    /// No info string: plain monospace.
    Plain,
}

impl FenceKind {
    /// Classify an info string. Only the first token counts: "rust,ignore"
    /// highlights as rust.
    pub fn classify(info: &str) -> Self {
        let tag = info
            .trim()
            .split(|c: char| c.is_whitespace() || c == ',')
            .next()
            .unwrap_or("");
        if tag.is_empty() {
            FenceKind::Plain
        } else if tag == DIAGRAM_TAG {
            FenceKind::Diagram
        } else {
            FenceKind::Code(tag.to_string())
        }
    }

    /// The language tag as text, for badges and fallbacks.
    pub fn label(&self) -> &str {
        match self {
            FenceKind::Diagram => DIAGRAM_TAG,
            FenceKind::Code(lang) => lang,
            FenceKind::Plain => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Code(String),
    Emphasis(Vec<Inline>),
    Strong(Vec<Inline>),
    Strikethrough(Vec<Inline>),
    Link { url: String, children: Vec<Inline> },
    HardBreak,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Vec<Inline>),
    Heading {
        level: u8,
        content: Vec<Inline>,
    },
    /// A fenced (or indented) code block. `closed` is false while the
    /// closing delimiter has not arrived yet.
    CodeFence {
        kind: FenceKind,
        text: String,
        closed: bool,
    },
    List {
        /// `Some(n)` for an ordered list starting at `n`.
        start: Option<u64>,
        items: Vec<Vec<Block>>,
    },
    BlockQuote(Vec<Block>),
    Rule,
}

impl Inline {
    /// Concatenated plain text of this inline and its children.
    pub fn plain_text(&self) -> String {
        match self {
            Inline::Text(s) | Inline::Code(s) => s.clone(),
            Inline::Emphasis(children)
            | Inline::Strong(children)
            | Inline::Strikethrough(children)
            | Inline::Link { children, .. } => {
                children.iter().map(Inline::plain_text).collect()
            }
            Inline::HardBreak => "\n".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_diagram_tag() {
        assert_eq!(FenceKind::classify("mermaid"), FenceKind::Diagram);
        assert_eq!(FenceKind::classify(" mermaid "), FenceKind::Diagram);
    }

    #[test]
    fn test_classify_language() {
        assert_eq!(FenceKind::classify("js"), FenceKind::Code("js".into()));
        assert_eq!(FenceKind::classify("rust,ignore"), FenceKind::Code("rust".into()));
    }

    #[test]
    fn test_classify_empty_is_plain() {
        assert_eq!(FenceKind::classify(""), FenceKind::Plain);
        assert_eq!(FenceKind::classify("   "), FenceKind::Plain);
    }

    #[test]
    fn test_plain_text_recurses() {
        let inline = Inline::Strong(vec![
            Inline::Text("bold ".into()),
            Inline::Emphasis(vec![Inline::Text("both".into())]),
        ]);
        assert_eq!(inline.plain_text(), "bold both");
    }
}
