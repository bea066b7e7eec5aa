use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_core::{
    Backend, BackendConfig, ChatRequest, ChatStream, ConversationId, ConversationSummary, Error,
    Turn, Utf8StreamDecoder,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// reqwest implementation of the backend transport.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        // Configure the client for chunk-at-a-time streaming:
        // - HTTP/1.1 avoids HTTP/2 framing delays on small chunks
        // - automatic decompression can buffer the entire response
        let client = Client::builder()
            .http1_only()
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .unwrap_or_else(|_| Client::new());

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| Error::serialization(e.to_string()))
    }

    async fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| Error::serialization(e.to_string()))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, Error> {
        self.get_json("/api/conversations").await
    }

    async fn create_conversation(&self, title: &str) -> Result<ConversationSummary, Error> {
        debug!(title, "creating conversation");
        self.post_json("/api/conversations", &serde_json::json!({ "title": title }))
            .await
    }

    async fn fetch_history(&self, id: ConversationId) -> Result<Vec<Turn>, Error> {
        self.get_json(&format!("/api/history/{id}")).await
    }

    async fn open_chat(&self, request: ChatRequest) -> Result<ChatStream, Error> {
        debug!(conversation = %request.conversation_id, "opening chat stream");

        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Request-level error: no partial content was produced.
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(status.as_u16(), body));
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let (tx, rx) = mpsc::channel::<Result<String, Error>>(100);

        // Read loop: owns the connection and the decoder buffer; both are
        // dropped on any exit path, cancellation included.
        tokio::spawn(async move {
            let mut response = response;
            let mut decoder = Utf8StreamDecoder::new();

            loop {
                let chunk = tokio::select! {
                    // Cancellation wins over an already-readable chunk.
                    biased;
                    _ = token.cancelled() => {
                        debug!("chat stream cancelled");
                        return;
                    }
                    chunk = response.chunk() => chunk,
                };

                match chunk {
                    Ok(Some(bytes)) => {
                        let fragment = match decoder.feed(&bytes) {
                            Ok(fragment) => fragment,
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        };
                        if fragment.is_empty() {
                            continue;
                        }
                        if tx.send(Ok(fragment)).await.is_err() {
                            // Consumer dropped the stream; stop reading.
                            return;
                        }
                    }
                    Ok(None) => {
                        // End of body; drain anything the decoder held back.
                        match decoder.finish() {
                            Ok(Some(tail)) => {
                                let _ = tx.send(Ok(tail)).await;
                            }
                            Ok(None) => {}
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                            }
                        }
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "chat stream transport error");
                        let _ = tx.send(Err(Error::network(e.to_string()))).await;
                        return;
                    }
                }
            }
        });

        Ok(ChatStream::new(Box::pin(ReceiverStream::new(rx)), cancel))
    }

    async fn fetch_config(&self) -> Result<BackendConfig, Error> {
        self.get_json("/api/config").await
    }

    async fn store_config(&self, config: &BackendConfig) -> Result<(), Error> {
        let response = self
            .client
            .post(self.url("/api/config"))
            .json(config)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(status.as_u16(), body));
        }
        Ok(())
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
