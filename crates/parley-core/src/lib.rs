//! parley-core: Core types and contracts for the parley chat client
//!
//! This crate provides the domain model of the streaming message pipeline:
//! turns and the message log, the incremental UTF-8 decoder, the backend
//! transport contract, backend configuration shapes, and the error taxonomy.

pub mod backend;
pub mod config;
pub mod decode;
pub mod error;
pub mod log;
pub mod turn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{Backend, ChatRequest, ChatStream, FragmentStream};
pub use config::{BackendConfig, McpServer, McpTransport, ProviderKind};
pub use decode::Utf8StreamDecoder;
pub use error::Error;
pub use log::{LogEntry, MessageLog, StreamOutcome, TurnState};
pub use turn::{ConversationId, ConversationSummary, Role, Turn};

pub type Result<T> = std::result::Result<T, Error>;
