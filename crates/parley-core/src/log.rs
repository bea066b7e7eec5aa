//! Ordered, mutable history of turns for one conversation view.
//!
//! Exactly one entry may be in-progress at a time: the most recently
//! appended assistant turn while a stream is active. Content is append-only
//! while streaming; once sealed an entry is immutable history.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::turn::Turn;

/// Terminal outcome of one streaming session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Complete,
    Aborted,
    Failed(String),
}

/// Lifecycle state of a log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnState {
    /// Immutable history.
    Final,
    /// The single in-progress entry; `append_fragment` is valid.
    Streaming,
    /// Stream was cancelled; partial content preserved.
    Aborted,
    /// Stream or send failed; partial content preserved, error retained.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub turn: Turn,
    pub state: TurnState,
}

impl LogEntry {
    pub fn is_streaming(&self) -> bool {
        matches!(self.state, TurnState::Streaming)
    }
}

/// Message log for a single conversation view.
///
/// Mutated exclusively by the controller; everything else reads snapshots.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<LogEntry>,
    streaming: Option<usize>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed turn; returns its index.
    pub fn append(&mut self, turn: Turn) -> usize {
        self.entries.push(LogEntry {
            turn,
            state: TurnState::Final,
        });
        self.entries.len() - 1
    }

    /// Append a turn in `Streaming` state; returns its index.
    ///
    /// Fails if another entry is already streaming.
    pub fn begin_streaming(&mut self, turn: Turn) -> Result<usize, Error> {
        if let Some(idx) = self.streaming {
            return Err(Error::invalid_state(format!(
                "entry {idx} is already streaming"
            )));
        }
        self.entries.push(LogEntry {
            turn,
            state: TurnState::Streaming,
        });
        let idx = self.entries.len() - 1;
        self.streaming = Some(idx);
        Ok(idx)
    }

    /// Concatenate `text` onto the streaming entry at `index`.
    ///
    /// Valid only while that entry is the in-progress one.
    pub fn append_fragment(&mut self, index: usize, text: &str) -> Result<(), Error> {
        if self.streaming != Some(index) {
            return Err(Error::invalid_state(format!(
                "append_fragment on non-streaming entry {index}"
            )));
        }
        // streaming == Some(index) implies the index is in range
        self.entries[index].turn.content.push_str(text);
        Ok(())
    }

    /// Seal the streaming entry at `index` with its terminal outcome.
    pub fn seal(&mut self, index: usize, outcome: StreamOutcome) -> Result<(), Error> {
        if self.streaming != Some(index) {
            return Err(Error::invalid_state(format!(
                "seal on non-streaming entry {index}"
            )));
        }
        self.entries[index].state = match outcome {
            StreamOutcome::Complete => TurnState::Final,
            StreamOutcome::Aborted => TurnState::Aborted,
            StreamOutcome::Failed(message) => TurnState::Failed(message),
        };
        self.streaming = None;
        Ok(())
    }

    /// Retain an error on a sealed entry (e.g. the user turn of a failed
    /// send). Content is untouched.
    pub fn annotate_failure(&mut self, index: usize, message: impl Into<String>) -> Result<(), Error> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or_else(|| Error::invalid_state(format!("no entry at {index}")))?;
        if entry.is_streaming() {
            return Err(Error::invalid_state(
                "annotate_failure on a streaming entry; seal it instead",
            ));
        }
        entry.state = TurnState::Failed(message.into());
        Ok(())
    }

    /// Immutable copy of the ordered entry list for rendering.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.clone()
    }

    /// Replace contents from backend history.
    ///
    /// Rejected while an entry is streaming; the caller must cancel first.
    pub fn hydrate(&mut self, turns: Vec<Turn>) -> Result<(), Error> {
        if self.streaming.is_some() {
            return Err(Error::invalid_state("hydrate while streaming"));
        }
        self.entries = turns
            .into_iter()
            .map(|turn| LogEntry {
                turn,
                state: TurnState::Final,
            })
            .collect();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.streaming = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn streaming_index(&self) -> Option<usize> {
        self.streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::Role;

    #[test]
    fn test_append_and_snapshot() {
        let mut log = MessageLog::new();
        let idx = log.append(Turn::user("Hello"));
        assert_eq!(idx, 0);
        let snap = log.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].turn.content, "Hello");
        assert_eq!(snap[0].state, TurnState::Final);
    }

    #[test]
    fn test_fragments_concatenate_in_order() {
        let mut log = MessageLog::new();
        log.append(Turn::user("Hello"));
        let idx = log.begin_streaming(Turn::assistant("")).unwrap();
        log.append_fragment(idx, "Hi").unwrap();
        log.append_fragment(idx, " there").unwrap();
        log.seal(idx, StreamOutcome::Complete).unwrap();
        assert_eq!(log.snapshot()[idx].turn.content, "Hi there");
        assert_eq!(log.snapshot()[idx].state, TurnState::Final);
    }

    #[test]
    fn test_fragment_after_seal_is_invalid_state() {
        let mut log = MessageLog::new();
        let idx = log.begin_streaming(Turn::assistant("")).unwrap();
        log.seal(idx, StreamOutcome::Complete).unwrap();
        let err = log.append_fragment(idx, "late").unwrap_err();
        assert!(err.is_contract_violation());
        // Log contents are not corrupted by the rejected call.
        assert_eq!(log.snapshot()[idx].turn.content, "");
    }

    #[test]
    fn test_fragment_on_wrong_index_is_invalid_state() {
        let mut log = MessageLog::new();
        log.append(Turn::user("Hello"));
        let idx = log.begin_streaming(Turn::assistant("")).unwrap();
        assert!(log.append_fragment(0, "nope").unwrap_err().is_contract_violation());
        assert!(log.append_fragment(idx + 5, "nope").unwrap_err().is_contract_violation());
    }

    #[test]
    fn test_single_streaming_entry() {
        let mut log = MessageLog::new();
        log.begin_streaming(Turn::assistant("")).unwrap();
        let err = log.begin_streaming(Turn::assistant("")).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_abort_preserves_partial_content() {
        let mut log = MessageLog::new();
        let idx = log.begin_streaming(Turn::assistant("")).unwrap();
        log.append_fragment(idx, "partial ").unwrap();
        log.seal(idx, StreamOutcome::Aborted).unwrap();
        let snap = log.snapshot();
        assert_eq!(snap[idx].turn.content, "partial ");
        assert_eq!(snap[idx].state, TurnState::Aborted);
    }

    #[test]
    fn test_failed_outcome_retains_error() {
        let mut log = MessageLog::new();
        let idx = log.begin_streaming(Turn::assistant("")).unwrap();
        log.append_fragment(idx, "some text").unwrap();
        log.seal(idx, StreamOutcome::Failed("connection reset".into())).unwrap();
        let snap = log.snapshot();
        assert_eq!(snap[idx].turn.content, "some text");
        assert_eq!(snap[idx].state, TurnState::Failed("connection reset".into()));
    }

    #[test]
    fn test_annotate_failure_on_user_turn() {
        let mut log = MessageLog::new();
        let idx = log.append(Turn::user("Hello"));
        log.annotate_failure(idx, "could not create conversation").unwrap();
        let snap = log.snapshot();
        assert_eq!(snap[idx].turn.content, "Hello");
        assert!(matches!(snap[idx].state, TurnState::Failed(_)));
    }

    #[test]
    fn test_hydrate_replaces_history() {
        let mut log = MessageLog::new();
        log.append(Turn::user("old"));
        log.hydrate(vec![Turn::user("a"), Turn::assistant("b")]).unwrap();
        let snap = log.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[1].turn.role, Role::Assistant);
        assert!(snap.iter().all(|e| e.state == TurnState::Final));
    }

    #[test]
    fn test_hydrate_while_streaming_is_rejected() {
        let mut log = MessageLog::new();
        log.begin_streaming(Turn::assistant("")).unwrap();
        assert!(log.hydrate(vec![]).unwrap_err().is_contract_violation());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut log = MessageLog::new();
        let idx = log.begin_streaming(Turn::assistant("")).unwrap();
        let before = log.snapshot();
        log.append_fragment(idx, "later").unwrap();
        assert_eq!(before[idx].turn.content, "");
    }
}
