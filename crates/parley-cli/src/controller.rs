//! Session controller: the single owner of conversation state.
//!
//! All mutation happens on the UI task through `apply`; background tasks
//! only produce `SessionEvent`s. Events carry the generation they were
//! produced under, and `apply` drops anything from a superseded generation,
//! so a cancelled or switched-away stream can never corrupt the log no
//! matter how late its events arrive.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_core::{
    Backend, ChatRequest, ConversationId, ConversationSummary, Error, LogEntry, MessageLog,
    StreamOutcome, Turn,
};

/// Longest conversation title derived from the first message.
const TITLE_LEN: usize = 30;

/// What the background session tasks report back to the controller.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The conversation is resolved and the reply stream is open.
    Opened {
        generation: u64,
        conversation: ConversationSummary,
    },
    /// One text fragment of the in-progress reply.
    Fragment { generation: u64, text: String },
    /// The stream ended, one way or another.
    Closed {
        generation: u64,
        outcome: StreamOutcome,
    },
    /// The send failed before any reply content existed.
    SendFailed {
        generation: u64,
        user_index: usize,
        message: String,
    },
    /// Backend history for the active conversation.
    HistoryLoaded { generation: u64, turns: Vec<Turn> },
    /// History fetch failed; the view stays empty.
    HistoryFailed { generation: u64, message: String },
}

impl SessionEvent {
    fn generation(&self) -> u64 {
        match self {
            SessionEvent::Opened { generation, .. }
            | SessionEvent::Fragment { generation, .. }
            | SessionEvent::Closed { generation, .. }
            | SessionEvent::SendFailed { generation, .. }
            | SessionEvent::HistoryLoaded { generation, .. }
            | SessionEvent::HistoryFailed { generation, .. } => *generation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// A send task is running but the stream has not opened yet.
    Sending,
    /// Fragments are flowing into the log entry at this index.
    Streaming { entry: usize },
}

pub struct ChatController {
    backend: Arc<dyn Backend>,
    log: MessageLog,
    conversation: Option<ConversationSummary>,
    phase: Phase,
    generation: u64,
    cancel: Option<CancellationToken>,
    last_error: Option<String>,
}

impl ChatController {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            log: MessageLog::new(),
            conversation: None,
            phase: Phase::Idle,
            generation: 0,
            cancel: None,
            last_error: None,
        }
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.log.snapshot()
    }

    pub fn conversation(&self) -> Option<&ConversationSummary> {
        self.conversation.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Submit a user message. The user turn lands in the log immediately;
    /// everything else arrives later as events on `tx`.
    ///
    /// Rejected while a previous send is still active, and for blank input.
    pub fn send(&mut self, text: &str, tx: mpsc::Sender<SessionEvent>) -> Result<(), Error> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::invalid_state("empty message"));
        }
        if self.phase != Phase::Idle {
            return Err(Error::invalid_state("a reply is already in progress"));
        }

        // A send supersedes anything still in flight for this view, such
        // as a history load from a recent switch; orphan it so it cannot
        // rewrite the log underneath the new exchange.
        self.generation += 1;
        self.last_error = None;
        let user_index = self.log.append(Turn::user(text));
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.phase = Phase::Sending;

        let backend = Arc::clone(&self.backend);
        let generation = self.generation;
        let conversation = self.conversation.clone();
        let message = text.to_string();

        tokio::spawn(async move {
            run_session(backend, generation, conversation, message, user_index, token, tx).await;
        });
        Ok(())
    }

    /// Fold one event into the state. Stale-generation events are dropped.
    pub fn apply(&mut self, event: SessionEvent) -> Result<(), Error> {
        if event.generation() != self.generation {
            debug!(
                event_generation = event.generation(),
                current = self.generation,
                "dropping stale session event"
            );
            return Ok(());
        }

        match event {
            SessionEvent::Opened { conversation, .. } => {
                if self.conversation.is_none() {
                    self.conversation = Some(conversation);
                }
                let entry = self.log.begin_streaming(Turn::assistant(""))?;
                self.phase = Phase::Streaming { entry };
            }
            SessionEvent::Fragment { text, .. } => {
                if let Phase::Streaming { entry } = self.phase {
                    self.log.append_fragment(entry, &text)?;
                }
            }
            SessionEvent::Closed { outcome, .. } => {
                if let Phase::Streaming { entry } = self.phase {
                    if let StreamOutcome::Failed(message) = &outcome {
                        self.last_error = Some(message.clone());
                    }
                    self.log.seal(entry, outcome)?;
                }
                self.phase = Phase::Idle;
                self.cancel = None;
            }
            SessionEvent::SendFailed {
                user_index, message, ..
            } => {
                warn!(message, "send failed");
                self.last_error = Some(message.clone());
                self.log.annotate_failure(user_index, message)?;
                self.phase = Phase::Idle;
                self.cancel = None;
            }
            SessionEvent::HistoryLoaded { turns, .. } => {
                // Hydration replaces the whole log, which is only safe in
                // the quiescent state; a send bumps the generation, so a
                // same-generation load while busy cannot happen.
                if self.phase == Phase::Idle {
                    self.log.hydrate(turns)?;
                }
            }
            SessionEvent::HistoryFailed { message, .. } => {
                warn!(message, "history fetch failed");
                self.last_error = Some(message);
            }
        }
        Ok(())
    }

    /// Cancel the active stream. A no-op when nothing is streaming.
    pub fn stop(&mut self) {
        if let Some(token) = &self.cancel {
            token.cancel();
        }
    }

    /// Switch the view to an existing conversation. Any active stream is
    /// cancelled and its remaining events are orphaned by the generation
    /// bump; history loads in the background.
    pub fn switch_to(&mut self, conversation: ConversationSummary, tx: mpsc::Sender<SessionEvent>) {
        self.stop();
        self.generation += 1;
        self.phase = Phase::Idle;
        self.cancel = None;
        self.last_error = None;
        self.log.clear();

        let id = conversation.id;
        self.conversation = Some(conversation);

        let backend = Arc::clone(&self.backend);
        let generation = self.generation;
        tokio::spawn(async move {
            let event = match backend.fetch_history(id).await {
                Ok(turns) => SessionEvent::HistoryLoaded { generation, turns },
                Err(e) => SessionEvent::HistoryFailed {
                    generation,
                    message: e.to_string(),
                },
            };
            let _ = tx.send(event).await;
        });
    }

    /// Start a fresh, unbound conversation view. The next send creates a
    /// conversation on the backend.
    pub fn new_chat(&mut self) {
        self.stop();
        self.generation += 1;
        self.phase = Phase::Idle;
        self.cancel = None;
        self.last_error = None;
        self.conversation = None;
        self.log.clear();
    }
}

/// Derive a conversation title from the first message.
fn title_for(message: &str) -> String {
    message.chars().take(TITLE_LEN).collect()
}

async fn run_session(
    backend: Arc<dyn Backend>,
    generation: u64,
    conversation: Option<ConversationSummary>,
    message: String,
    user_index: usize,
    token: CancellationToken,
    tx: mpsc::Sender<SessionEvent>,
) {
    let conversation = match conversation {
        Some(existing) => existing,
        None => match backend.create_conversation(&title_for(&message)).await {
            Ok(created) => created,
            Err(e) => {
                let _ = tx
                    .send(SessionEvent::SendFailed {
                        generation,
                        user_index,
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        },
    };

    let request = ChatRequest {
        message,
        conversation_id: conversation.id,
    };
    let mut chat = match backend.open_chat(request).await {
        Ok(chat) => chat,
        Err(e) => {
            let _ = tx
                .send(SessionEvent::SendFailed {
                    generation,
                    user_index,
                    message: e.to_string(),
                })
                .await;
            return;
        }
    };

    let _ = tx
        .send(SessionEvent::Opened {
            generation,
            conversation,
        })
        .await;

    loop {
        let item = tokio::select! {
            biased;
            _ = token.cancelled() => {
                chat.cancel();
                let _ = tx
                    .send(SessionEvent::Closed {
                        generation,
                        outcome: StreamOutcome::Aborted,
                    })
                    .await;
                return;
            }
            item = chat.next() => item,
        };

        match item {
            Some(Ok(text)) => {
                if tx
                    .send(SessionEvent::Fragment { generation, text })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Some(Err(e)) => {
                let _ = tx
                    .send(SessionEvent::Closed {
                        generation,
                        outcome: StreamOutcome::Failed(e.to_string()),
                    })
                    .await;
                return;
            }
            None => {
                let outcome = if token.is_cancelled() {
                    StreamOutcome::Aborted
                } else {
                    StreamOutcome::Complete
                };
                let _ = tx
                    .send(SessionEvent::Closed { generation, outcome })
                    .await;
                return;
            }
        }
    }
}
