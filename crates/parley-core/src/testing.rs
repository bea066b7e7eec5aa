//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, ChatRequest, ChatStream};
use crate::config::BackendConfig;
use crate::error::Error;
use crate::turn::{ConversationId, ConversationSummary, Turn};

/// One step of a scripted chat stream.
#[derive(Debug, Clone)]
pub enum ScriptItem {
    /// Deliver a text fragment.
    Fragment(String),
    /// Fail mid-stream (fragments already delivered stay delivered).
    Error(String),
    /// Sleep before the next item, so tests can interleave cancellation.
    Wait(Duration),
    /// Park until the session is cancelled, then end the stream.
    HoldUntilCancelled,
}

/// A scripted response to `open_chat`.
#[derive(Debug, Clone)]
pub enum MockChat {
    /// Request-level failure: `open_chat` itself errors, no stream opens.
    Reject(u16, String),
    /// A stream that plays the script in order.
    Script(Vec<ScriptItem>),
}

impl MockChat {
    /// Convenience: a stream of plain fragments ending successfully.
    pub fn fragments(parts: &[&str]) -> Self {
        MockChat::Script(parts.iter().map(|p| ScriptItem::Fragment(p.to_string())).collect())
    }
}

/// A mock backend with scripted responses and captured requests.
#[derive(Default)]
pub struct MockBackend {
    conversations: Mutex<Vec<ConversationSummary>>,
    histories: Mutex<Vec<(ConversationId, Vec<Turn>)>>,
    chats: Mutex<Vec<MockChat>>,
    configs: Mutex<Vec<BackendConfig>>,
    create_failure: Mutex<Option<(u16, String)>>,

    /// Captured for assertions.
    pub created_titles: Mutex<Vec<String>>,
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub stored_configs: Mutex<Vec<BackendConfig>>,

    next_id: Mutex<i64>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1),
            ..Default::default()
        }
    }

    pub fn queue_conversations(&self, summaries: Vec<ConversationSummary>) {
        *self.conversations.lock().unwrap() = summaries;
    }

    pub fn queue_history(&self, id: ConversationId, turns: Vec<Turn>) {
        self.histories.lock().unwrap().push((id, turns));
    }

    /// Queue a response for the next `open_chat` call (FIFO).
    pub fn queue_chat(&self, chat: MockChat) {
        self.chats.lock().unwrap().insert(0, chat);
    }

    pub fn queue_config(&self, config: BackendConfig) {
        self.configs.lock().unwrap().insert(0, config);
    }

    /// Make the next `create_conversation` call fail.
    pub fn fail_next_create(&self, status: u16, message: &str) {
        *self.create_failure.lock().unwrap() = Some((status, message.to_string()));
    }

    pub fn chat_request_count(&self) -> usize {
        self.chat_requests.lock().unwrap().len()
    }

    pub fn last_chat_request(&self) -> Option<ChatRequest> {
        self.chat_requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, Error> {
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn create_conversation(&self, title: &str) -> Result<ConversationSummary, Error> {
        if let Some((status, message)) = self.create_failure.lock().unwrap().take() {
            return Err(Error::transport(status, message));
        }
        self.created_titles.lock().unwrap().push(title.to_string());
        let mut next = self.next_id.lock().unwrap();
        let id = ConversationId(*next);
        *next += 1;
        let summary = ConversationSummary {
            id,
            title: title.to_string(),
        };
        self.conversations.lock().unwrap().push(summary.clone());
        Ok(summary)
    }

    async fn fetch_history(&self, id: ConversationId) -> Result<Vec<Turn>, Error> {
        self.histories
            .lock()
            .unwrap()
            .iter()
            .find(|(hid, _)| *hid == id)
            .map(|(_, turns)| turns.clone())
            .ok_or_else(|| Error::transport(404, format!("no history for conversation {id}")))
    }

    async fn open_chat(&self, request: ChatRequest) -> Result<ChatStream, Error> {
        self.chat_requests.lock().unwrap().push(request);
        let chat = self
            .chats
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| MockChat::fragments(&[]));

        let script = match chat {
            MockChat::Reject(status, message) => return Err(Error::transport(status, message)),
            MockChat::Script(script) => script,
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let (tx, rx) = mpsc::channel::<Result<String, Error>>(16);

        tokio::spawn(async move {
            for item in script {
                if token.is_cancelled() {
                    return;
                }
                match item {
                    ScriptItem::Fragment(text) => {
                        if tx.send(Ok(text)).await.is_err() {
                            return;
                        }
                    }
                    ScriptItem::Error(message) => {
                        let _ = tx.send(Err(Error::network(message))).await;
                        return;
                    }
                    ScriptItem::Wait(duration) => {
                        tokio::select! {
                            _ = token.cancelled() => return,
                            _ = tokio::time::sleep(duration) => {}
                        }
                    }
                    ScriptItem::HoldUntilCancelled => {
                        token.cancelled().await;
                        return;
                    }
                }
            }
        });

        Ok(ChatStream::new(Box::pin(ReceiverStream::new(rx)), cancel))
    }

    async fn fetch_config(&self) -> Result<BackendConfig, Error> {
        Ok(self.configs.lock().unwrap().pop().unwrap_or_default())
    }

    async fn store_config(&self, config: &BackendConfig) -> Result<(), Error> {
        self.stored_configs.lock().unwrap().push(config.clone());
        Ok(())
    }
}
