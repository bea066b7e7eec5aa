//! Contract for the backend HTTP collaborator.
//!
//! The client consumes these operations, it never implements the server
//! side. Every failure here is recoverable per call; nothing is
//! process-fatal.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::BackendConfig;
use crate::error::Error;
use crate::turn::{ConversationId, ConversationSummary, Turn};

/// Lazy, finite sequence of text fragments from one chat response.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, Error>> + Send>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: ConversationId,
}

/// One in-flight chat response: a fragment stream plus its cancellation
/// handle. Not restartable; a new send requires a new `open_chat`.
///
/// Terminals: end of stream (success), an `Err` item (stream-level error;
/// fragments already delivered stay with the caller), or cancellation (the
/// stream ends without further items).
pub struct ChatStream {
    fragments: FragmentStream,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl ChatStream {
    pub fn new(fragments: FragmentStream, cancel: CancellationToken) -> Self {
        Self { fragments, cancel }
    }

    /// Signal the transport to abort. Idempotent; a no-op after completion
    /// or a prior cancel.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Clone of the session's cancellation handle, for an owner that
    /// outlives the fragment loop.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for ChatStream {
    type Item = Result<String, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.fragments.as_mut().poll_next(cx)
    }
}

/// Operations the chat backend exposes, per its HTTP API.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `GET /api/conversations`
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, Error>;

    /// `POST /api/conversations` with `{title}`
    async fn create_conversation(&self, title: &str) -> Result<ConversationSummary, Error>;

    /// `GET /api/history/{id}`
    async fn fetch_history(&self, id: ConversationId) -> Result<Vec<Turn>, Error>;

    /// `POST /api/chat`; a non-2xx status before any bytes is a
    /// request-level error from this call, with no partial content.
    async fn open_chat(&self, request: ChatRequest) -> Result<ChatStream, Error>;

    /// `GET /api/config`
    async fn fetch_config(&self) -> Result<BackendConfig, Error>;

    /// `POST /api/config`
    async fn store_config(&self, config: &BackendConfig) -> Result<(), Error>;
}
