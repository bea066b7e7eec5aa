//! Structured rendering of conversational content.
//!
//! Raw reply text is parsed into a block tree (`parse::render`), which is
//! pure derived data: the transcript re-renders from raw text after every
//! fragment rather than patching a previous render. Fenced code is
//! syntax-highlighted, and diagram fences go through an asynchronous
//! compile worker whose failures stay inline.

pub mod diagram;
pub mod highlight;
pub mod parse;
pub mod text;
pub mod tree;

pub use diagram::{DiagramBackend, DiagramState, DiagramWorker, KrokiBackend, DEFAULT_DIAGRAM_URL};
pub use highlight::highlight_code;
pub use parse::render;
pub use text::blocks_to_text;
pub use tree::{Block, FenceKind, Inline, DIAGRAM_TAG};
