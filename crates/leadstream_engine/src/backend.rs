use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use leadstream_core::{AudioAttachment, HistoryEntry, SearchParameters};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use url::Url;

use crate::types::TranscriptionResponse;
use crate::{FailureKind, SearchRequest, TransportError};

/// Raw body chunks of an open search stream, in arrival order.
pub type ChunkStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Plain-text error bodies longer than this are not shown to users.
const MAX_PLAIN_DETAIL: usize = 200;
/// JSON keys checked, in order, for a server-provided error explanation.
const DETAIL_KEYS: [&str; 3] = ["detail", "error", "message"];

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub search_path: String,
    pub transcribe_path: String,
    pub history_path: String,
    pub connect_timeout: Duration,
    /// Applies to transcription and history calls. The search stream is
    /// bounded by the controller's session timeout instead.
    pub request_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            search_path: "/api/search/stream".to_string(),
            transcribe_path: "/api/transcribe".to_string(),
            history_path: "/api/history".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    /// Sends the search and returns the response body as a chunk stream.
    ///
    /// Non-success statuses are errors; their message is the server's
    /// explanation when one was sent.
    async fn open_stream(&self, parameters: &SearchParameters)
        -> Result<ChunkStream, TransportError>;
}

#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioAttachment) -> Result<String, TransportError>;
}

#[async_trait::async_trait]
pub trait HistoryRecorder: Send + Sync {
    async fn record(&self, entry: &HistoryEntry) -> Result<(), TransportError>;
}

/// HTTP implementation of every backend collaborator.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    settings: BackendSettings,
    base: Url,
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, TransportError> {
        let base = Url::parse(&settings.base_url)
            .map_err(|err| TransportError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| TransportError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            base,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path)
            .map_err(|err| TransportError::new(FailureKind::InvalidUrl, err.to_string()))
    }
}

#[async_trait::async_trait]
impl SearchBackend for ReqwestBackend {
    async fn open_stream(
        &self,
        parameters: &SearchParameters,
    ) -> Result<ChunkStream, TransportError> {
        let url = self.endpoint(&self.settings.search_path)?;
        let body = serde_json::to_vec(&SearchRequest::from(parameters))
            .map_err(|err| TransportError::new(FailureKind::InvalidRequest, err.to_string()))?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response).await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed())
    }
}

#[async_trait::async_trait]
impl Transcriber for ReqwestBackend {
    async fn transcribe(&self, audio: &AudioAttachment) -> Result<String, TransportError> {
        let url = self.endpoint(&self.settings.transcribe_path)?;
        let part = reqwest::multipart::Part::bytes(audio.data.clone())
            .file_name(audio.file_name.clone())
            .mime_str(&audio.mime_type)
            .map_err(|err| TransportError::new(FailureKind::InvalidRequest, err.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(url)
            .timeout(self.settings.request_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response).await?;

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        let parsed: TranscriptionResponse = serde_json::from_slice(&body)
            .map_err(|err| TransportError::new(FailureKind::InvalidResponse, err.to_string()))?;
        Ok(parsed.text)
    }
}

#[async_trait::async_trait]
impl HistoryRecorder for ReqwestBackend {
    async fn record(&self, entry: &HistoryEntry) -> Result<(), TransportError> {
        let url = self.endpoint(&self.settings.history_path)?;
        let body = serde_json::to_vec(entry)
            .map_err(|err| TransportError::new(FailureKind::InvalidRequest, err.to_string()))?;

        let response = self
            .client
            .post(url)
            .timeout(self.settings.request_timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        ensure_success(response).await?;
        Ok(())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = server_detail(&body)
        .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
    Err(TransportError::new(
        FailureKind::HttpStatus(status.as_u16()),
        message,
    ))
}

/// Pulls a human-readable explanation out of an error body, if there is one.
fn server_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(body) {
        Ok(value) => DETAIL_KEYS
            .iter()
            .find_map(|key| value.get(key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|detail| !detail.is_empty())
            .map(ToOwned::to_owned),
        Err(_) if body.len() <= MAX_PLAIN_DETAIL && !body.starts_with('<') => {
            Some(body.to_string())
        }
        Err(_) => None,
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return TransportError::new(FailureKind::InvalidResponse, err.to_string());
    }
    TransportError::new(FailureKind::Network, err.to_string())
}
