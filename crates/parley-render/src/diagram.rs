//! Diagram compilation: fenced diagram sources are sent to a rendering
//! service off the UI path, and the transcript shows a placeholder until a
//! result (or failure) comes back.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_core::Error;

pub const DEFAULT_DIAGRAM_URL: &str = "https://kroki.io";

/// Delay before an in-flight compile actually hits the service, so a fence
/// re-submitted on every render frame results in one request.
const DEBOUNCE: Duration = Duration::from_millis(300);

/// Where a diagram fence currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagramState {
    /// Submitted but not compiled yet; the UI shows the raw source dimmed.
    Pending,
    /// Compiled output, ready to show.
    Ready(String),
    /// The compiler rejected the source. Shown inline, never fatal.
    Failed(String),
}

/// A service that turns diagram source text into displayable output.
#[async_trait]
pub trait DiagramBackend: Send + Sync {
    async fn compile(&self, source: &str) -> Result<String, Error>;
}

/// HTTP diagram compiler speaking the Kroki API.
pub struct KrokiBackend {
    client: reqwest::Client,
    base_url: String,
}

impl KrokiBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

impl Default for KrokiBackend {
    fn default() -> Self {
        Self::new(DEFAULT_DIAGRAM_URL)
    }
}

#[async_trait]
impl DiagramBackend for KrokiBackend {
    async fn compile(&self, source: &str) -> Result<String, Error> {
        let url = format!("{}/mermaid/svg", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(source.to_string())
            .send()
            .await
            .map_err(|e| Error::render(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::render(format!("diagram service {status}: {body}")));
        }
        Ok(body)
    }
}

/// One fence's compile slot: its visible state plus the cancellation
/// handle while a compile is in flight.
struct Slot {
    state: DiagramState,
    token: Option<CancellationToken>,
}

/// Owns diagram compilation for a transcript. Results are cached by source
/// hash so re-renders of unchanged fences never re-compile; each fence
/// carries its own in-flight token, so several diagrams in one transcript
/// compile independently.
pub struct DiagramWorker {
    backend: Arc<dyn DiagramBackend>,
    slots: Arc<Mutex<HashMap<u64, Slot>>>,
    debounce: Duration,
}

impl DiagramWorker {
    pub fn new(backend: Arc<dyn DiagramBackend>) -> Self {
        Self {
            backend,
            slots: Arc::new(Mutex::new(HashMap::new())),
            debounce: DEBOUNCE,
        }
    }

    #[cfg(test)]
    fn with_debounce(backend: Arc<dyn DiagramBackend>, debounce: Duration) -> Self {
        Self {
            backend,
            slots: Arc::new(Mutex::new(HashMap::new())),
            debounce,
        }
    }

    fn hash(source: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        hasher.finish()
    }

    /// Current state for a fence's source, if it was ever submitted.
    pub fn lookup(&self, source: &str) -> Option<DiagramState> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(&Self::hash(source)).map(|slot| slot.state.clone())
    }

    /// Submit a diagram source for compilation. A repeat submission of the
    /// same source (the render loop submits every frame) is a no-op.
    pub fn submit(&self, source: &str) {
        let key = Self::hash(source);
        let token = CancellationToken::new();
        {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            if slots.contains_key(&key) {
                return;
            }
            slots.insert(
                key,
                Slot {
                    state: DiagramState::Pending,
                    token: Some(token.clone()),
                },
            );
        }

        let backend = Arc::clone(&self.backend);
        let slots = Arc::clone(&self.slots);
        let source = source.to_string();
        let debounce = self.debounce;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("diagram compile abandoned during debounce");
                    let mut slots = slots.lock().unwrap_or_else(|e| e.into_inner());
                    slots.remove(&key);
                    return;
                }
                _ = tokio::time::sleep(debounce) => {}
            }

            let result = tokio::select! {
                _ = token.cancelled() => {
                    debug!("diagram compile abandoned in flight");
                    let mut slots = slots.lock().unwrap_or_else(|e| e.into_inner());
                    slots.remove(&key);
                    return;
                }
                result = backend.compile(&source) => result,
            };

            let state = match result {
                Ok(rendered) => DiagramState::Ready(rendered),
                Err(e) => {
                    warn!(error = %e, "diagram compile failed");
                    DiagramState::Failed(e.to_string())
                }
            };
            let mut slots = slots.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = slots.get_mut(&key) {
                slot.state = state;
                slot.token = None;
            }
        });
    }

    /// Drop all cached results and abandon in-flight compiles, e.g. when
    /// switching conversations.
    pub fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        for slot in slots.values() {
            if let Some(token) = &slot.token {
                token.cancel();
            }
        }
        slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedDiagrams {
        calls: AtomicUsize,
        results: Mutex<Vec<Result<String, Error>>>,
    }

    impl ScriptedDiagrams {
        fn new(results: Vec<Result<String, Error>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                results: Mutex::new(results),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DiagramBackend for ScriptedDiagrams {
        async fn compile(&self, _source: &str) -> Result<String, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Ok("<svg/>".to_string())
            } else {
                results.remove(0)
            }
        }
    }

    async fn settle(worker: &DiagramWorker, source: &str) -> DiagramState {
        for _ in 0..200 {
            match worker.lookup(source) {
                Some(DiagramState::Pending) | None => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                Some(state) => return state,
            }
        }
        panic!("diagram never settled");
    }

    #[tokio::test]
    async fn test_successful_compile_becomes_ready() {
        let backend = ScriptedDiagrams::new(vec![Ok("<svg>d</svg>".into())]);
        let worker = DiagramWorker::with_debounce(backend.clone(), Duration::from_millis(1));

        worker.submit("graph TD;");
        assert_eq!(worker.lookup("graph TD;"), Some(DiagramState::Pending));

        let state = settle(&worker, "graph TD;").await;
        assert_eq!(state, DiagramState::Ready("<svg>d</svg>".into()));
    }

    #[tokio::test]
    async fn test_compile_failure_is_inline_not_fatal() {
        let backend = ScriptedDiagrams::new(vec![Err(Error::render("syntax error at line 2"))]);
        let worker = DiagramWorker::with_debounce(backend, Duration::from_millis(1));

        worker.submit("graph TD bad");
        let state = settle(&worker, "graph TD bad").await;
        match state {
            DiagramState::Failed(message) => assert!(message.contains("syntax error")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_repeat_submission_hits_cache() {
        let backend = ScriptedDiagrams::new(vec![Ok("<svg/>".into())]);
        let worker = DiagramWorker::with_debounce(backend.clone(), Duration::from_millis(1));

        worker.submit("graph LR;");
        settle(&worker, "graph LR;").await;
        worker.submit("graph LR;");
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_two_diagrams_compile_independently() {
        let backend = ScriptedDiagrams::new(vec![]);
        let worker = DiagramWorker::with_debounce(backend.clone(), Duration::from_millis(50));

        // Two closed fences in one transcript get re-submitted every
        // frame; neither submission may starve the other's debounce.
        for _ in 0..10 {
            worker.submit("graph TD; A-->B");
            worker.submit("sequenceDiagram; X->>Y: hi");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let first = settle(&worker, "graph TD; A-->B").await;
        let second = settle(&worker, "sequenceDiagram; X->>Y: hi").await;
        assert!(matches!(first, DiagramState::Ready(_)));
        assert!(matches!(second, DiagramState::Ready(_)));
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_clear_abandons_in_flight_compile() {
        let backend = ScriptedDiagrams::new(vec![]);
        let worker = DiagramWorker::with_debounce(backend.clone(), Duration::from_millis(50));

        worker.submit("graph TD;");
        worker.clear();
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(worker.lookup("graph TD;"), None);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_forgets_results() {
        let backend = ScriptedDiagrams::new(vec![Ok("<svg/>".into())]);
        let worker = DiagramWorker::with_debounce(backend, Duration::from_millis(1));

        worker.submit("graph TD;");
        settle(&worker, "graph TD;").await;
        worker.clear();
        assert_eq!(worker.lookup("graph TD;"), None);
    }
}
