use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ApiError, StreamError};

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Applies to search and status requests, not the download stream.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum silence between download stream messages. The server prepares the
/// dataset while the stream is open, so the gap is generous.
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
}

/// One search match returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub similarity: f64,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetStatus {
    pub exists: bool,
    pub image_count: u64,
    pub data_path: String,
}

/// One parsed message from the dataset download stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Completed,
    Failed(String),
    /// Recognized but not yet surfaced; the wire format reserves it.
    Progress,
}

/// Typed client for the image-retrieval backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new() -> Self {
        let base_url =
            std::env::var("IMAGE_SEEK_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        log::info!("Backend API: {base_url}");
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ApiError> {
        let url = format!("{}/api/v1/search/", self.base_url);
        let resp = self
            .http
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&SearchRequest { query })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status()));
        }
        let body: SearchResponse = resp.json().await?;
        Ok(body.results)
    }

    pub async fn dataset_status(&self) -> Result<DatasetStatus, ApiError> {
        let url = format!("{}/api/v1/dataset/", self.base_url);
        let resp = self.http.get(&url).timeout(REQUEST_TIMEOUT).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status()));
        }
        Ok(resp.json().await?)
    }

    /// Open the dataset download stream. Dropping the returned response
    /// closes the server channel; the caller owns its lifetime.
    pub async fn open_dataset_stream(&self) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}/api/v1/dataset/stream/", self.base_url);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status()));
        }
        Ok(resp)
    }
}

/// Incremental splitter for SSE lines arriving in arbitrary chunk sizes.
pub struct SseLineBuffer {
    buf: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    /// Feed a chunk, returning the `data:` payloads of every line the chunk
    /// completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        let mut payloads = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(payload) = line.strip_prefix("data:") {
                payloads.push(payload.trim_start().to_string());
            }
        }
        payloads
    }
}

#[derive(Deserialize)]
struct StreamPayload {
    status: Option<String>,
    error: Option<String>,
}

/// Parse one `data:` payload from the download stream. Malformed input is a
/// protocol error, which the download session treats as terminal.
pub fn parse_stream_message(payload: &str) -> Result<StreamMessage, StreamError> {
    let msg: StreamPayload = serde_json::from_str(payload)
        .map_err(|e| StreamError::Protocol(format!("{payload:?}: {e}")))?;
    if let Some(error) = msg.error {
        return Ok(StreamMessage::Failed(error));
    }
    match msg.status.as_deref() {
        Some("completed") => Ok(StreamMessage::Completed),
        Some(_) => Ok(StreamMessage::Progress),
        None => Err(StreamError::Protocol(format!(
            "unrecognized message: {payload:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_terminal_success() {
        let msg = parse_stream_message(r#"{"status": "completed"}"#).unwrap();
        assert_eq!(msg, StreamMessage::Completed);
    }

    #[test]
    fn parses_terminal_failure() {
        let msg = parse_stream_message(r#"{"error": "disk full"}"#).unwrap();
        assert_eq!(msg, StreamMessage::Failed("disk full".to_string()));
    }

    #[test]
    fn unknown_status_is_progress() {
        let msg = parse_stream_message(r#"{"status": "downloading"}"#).unwrap();
        assert_eq!(msg, StreamMessage::Progress);
    }

    #[test]
    fn malformed_payloads_are_protocol_errors() {
        assert!(parse_stream_message("not json").is_err());
        assert!(parse_stream_message("{}").is_err());
        assert!(parse_stream_message(r#"{"unrelated": 1}"#).is_err());
    }

    #[test]
    fn line_buffer_reassembles_split_chunks() {
        let mut lines = SseLineBuffer::new();
        assert!(lines.feed(b"data: {\"status\":").is_empty());
        let payloads = lines.feed(b" \"completed\"}\n\n");
        assert_eq!(payloads, vec!["{\"status\": \"completed\"}".to_string()]);
    }

    #[test]
    fn line_buffer_ignores_non_data_lines() {
        let mut lines = SseLineBuffer::new();
        let payloads = lines.feed(b"event: tick\r\ndata: {\"error\": \"x\"}\r\n\r\n");
        assert_eq!(payloads, vec!["{\"error\": \"x\"}".to_string()]);
    }

    #[test]
    fn line_buffer_yields_multiple_messages_per_chunk() {
        let mut lines = SseLineBuffer::new();
        let payloads = lines.feed(b"data: a\n\ndata: b\n\n");
        assert_eq!(payloads, vec!["a".to_string(), "b".to_string()]);
    }
}
