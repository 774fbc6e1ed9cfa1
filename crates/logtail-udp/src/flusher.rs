// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch delivery to the Logtail ingestion endpoint.
//!
//! One flush cycle drains the entry buffer, joins the raw payloads into a single
//! `[p1,p2,...]` body and makes exactly one POST. Drained entries are never requeued: a
//! batch that fails to send, or is too small to send, is gone.

use crate::buffer::{EntryBuffer, LogEntry};
use crate::errors::ShippingError;
use crate::token::AuthToken;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use zstd::stream::write::Encoder;

pub struct FlusherConfig {
    pub token: AuthToken,
    pub buffer: Arc<EntryBuffer>,
    pub endpoint: String,
    pub https_proxy: Option<String>,
    pub compression_level: Option<i32>,
}

/// What a single flush cycle did with the entries it drained.
#[derive(Debug)]
pub enum FlushOutcome {
    /// Nothing was buffered, no request was made.
    Empty,
    /// Fewer entries than the minimum batch size. They were dropped without a request.
    BelowMinimum { discarded: usize },
    /// One request was made and answered, successfully or not.
    Sent { entries: usize, status: StatusCode },
    /// The request could not be built or did not get an answer.
    Failed {
        entries: usize,
        error: ShippingError,
    },
}

#[derive(Clone)]
pub struct Flusher {
    client: reqwest::Client,
    token: AuthToken,
    endpoint: String,
    compression_level: Option<i32>,
    buffer: Arc<EntryBuffer>,
}

impl Flusher {
    pub fn new(config: FlusherConfig) -> Self {
        Flusher {
            client: get_client(config.https_proxy.as_deref()),
            token: config.token,
            endpoint: config.endpoint,
            compression_level: config.compression_level,
            buffer: config.buffer,
        }
    }

    /// Drain the buffer and send whatever was in it
    pub async fn flush(&self, min_batch_size: usize) -> FlushOutcome {
        let batch = self.buffer.drain_available();
        self.flush_batch(batch, min_batch_size).await
    }

    /// Send an already drained batch
    pub async fn flush_batch(&self, batch: Vec<LogEntry>, min_batch_size: usize) -> FlushOutcome {
        let entries = batch.len();
        debug!("Have {entries} log entries to flush");

        if entries == 0 {
            return FlushOutcome::Empty;
        }
        if entries < min_batch_size {
            warn!(
                "Discarding {entries} log entries: fewer than the minimum batch size of {min_batch_size}"
            );
            return FlushOutcome::BelowMinimum { discarded: entries };
        }

        let payload = build_payload(&batch);
        drop(batch);

        match self.ship(payload).await {
            Ok(status) => FlushOutcome::Sent { entries, status },
            Err(error) => {
                error!("Failed to flush {entries} log entries: {error}");
                FlushOutcome::Failed { entries, error }
            }
        }
    }

    async fn ship(&self, payload: Vec<u8>) -> Result<StatusCode, ShippingError> {
        let headers = self.headers()?;
        let body = self.compress(payload)?;

        let resp = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| ShippingError::Destination(e.status(), e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            info!("Response: Status = {status}");
        } else {
            // The batch is already out of the buffer, the body is only read for the log.
            error!(
                "{}: Failed to push to Logtail: {:?}",
                status,
                resp.text().await.unwrap_or_default()
            );
        }
        Ok(status)
    }

    fn headers(&self) -> Result<HeaderMap, ShippingError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            self.token
                .bearer_header()
                .map_err(|e| ShippingError::Payload(format!("invalid token: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if self.compression_level.is_some() {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("zstd"));
        }
        Ok(headers)
    }

    fn compress(&self, data: Vec<u8>) -> Result<Vec<u8>, ShippingError> {
        let Some(level) = self.compression_level else {
            return Ok(data);
        };
        encode(&data, level).map_err(|e| ShippingError::Payload(format!("compression: {e}")))
    }
}

/// Joins the raw payloads into one JSON-like array, `[p1,p2,...]`.
///
/// Payloads are copied verbatim. Nothing is escaped or validated, so each payload has to
/// already be a well-formed JSON value for the result to be valid JSON.
#[must_use]
pub fn build_payload(batch: &[LogEntry]) -> Vec<u8> {
    let size = batch.iter().map(|e| e.payload().len() + 1).sum::<usize>() + 1;
    let mut buffer = Vec::with_capacity(size);
    buffer.push(b'[');
    for (i, entry) in batch.iter().enumerate() {
        if i > 0 {
            buffer.push(b',');
        }
        buffer.extend_from_slice(entry.payload().as_bytes());
    }
    buffer.push(b']');
    buffer
}

fn encode(data: &[u8], level: i32) -> std::io::Result<Vec<u8>> {
    let mut encoder = Encoder::new(Vec::new(), level)?;
    encoder.write_all(data)?;
    encoder.finish()
}

fn get_client(https_proxy: Option<&str>) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();
    if let Some(proxy) = https_proxy {
        match reqwest::Proxy::https(proxy) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            ),
        }
    }
    match builder.build() {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}, using reqwest defaults", e);
            reqwest::Client::new()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mockito::Server;
    use tracing_test::traced_test;

    fn entry(payload: &str) -> LogEntry {
        LogEntry::new("127.0.0.1:40000", payload)
    }

    fn flusher(endpoint: String, token: &str, buffer: Arc<EntryBuffer>) -> Flusher {
        Flusher::new(FlusherConfig {
            token: AuthToken::new(token),
            buffer,
            endpoint,
            https_proxy: None,
            compression_level: None,
        })
    }

    async fn fill(buffer: &EntryBuffer, payloads: &[&str]) {
        for payload in payloads {
            buffer.insert(entry(payload)).await;
        }
    }

    #[test]
    fn test_build_payload() {
        let batch = vec![entry("a"), entry("b"), entry("c")];
        assert_eq!(build_payload(&batch), b"[a,b,c]");
        assert_eq!(build_payload(&[entry("only")]), b"[only]");
    }

    #[test]
    fn test_build_payload_keeps_payloads_verbatim() {
        let batch = vec![
            entry(r#"{"message":"with \"quotes\"","level":"info"}"#),
            entry(r#"{"message":"second"}"#),
        ];
        let payload = String::from_utf8(build_payload(&batch)).unwrap();
        assert_eq!(
            payload,
            r#"[{"message":"with \"quotes\"","level":"info"},{"message":"second"}]"#
        );

        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_encode_roundtrip() {
        let data = b"[{\"message\":\"compress me\"}]";
        let compressed = encode(data, 3).unwrap();
        assert_ne!(compressed, data);

        let decompressed = zstd::decode_all(&compressed[..]).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_headers() {
        let buffer = Arc::new(EntryBuffer::new(1));
        let flusher = flusher("https://example.com".to_string(), "tok", buffer);
        let headers = flusher.headers().unwrap();

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert!(!headers.contains_key(CONTENT_ENCODING));
    }

    #[tokio::test]
    async fn test_flush_sends_one_request_in_insertion_order() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer mock-token")
            .match_header("content-type", "application/json")
            .match_body("[a,b,c]")
            .with_status(202)
            .expect(1)
            .create_async()
            .await;

        let buffer = Arc::new(EntryBuffer::new(8));
        fill(&buffer, &["a", "b", "c"]).await;
        let flusher = flusher(server.url(), "mock-token", Arc::clone(&buffer));

        let outcome = flusher.flush(1).await;

        mock.assert_async().await;
        assert!(matches!(
            outcome,
            FlushOutcome::Sent {
                entries: 3,
                status: StatusCode::ACCEPTED
            }
        ));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_flush_empty_buffer_makes_no_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .expect(0)
            .create_async()
            .await;

        let buffer = Arc::new(EntryBuffer::new(8));
        let flusher = flusher(server.url(), "mock-token", buffer);

        assert!(matches!(flusher.flush(1).await, FlushOutcome::Empty));
        mock.assert_async().await;
    }

    #[tokio::test]
    #[traced_test]
    async fn test_flush_below_minimum_discards_entries() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .expect(0)
            .create_async()
            .await;

        let buffer = Arc::new(EntryBuffer::new(8));
        fill(&buffer, &["a", "b"]).await;
        let flusher = flusher(server.url(), "mock-token", Arc::clone(&buffer));

        let outcome = flusher.flush(3).await;

        assert!(matches!(
            outcome,
            FlushOutcome::BelowMinimum { discarded: 2 }
        ));
        assert!(buffer.is_empty());
        assert!(logs_contain("Discarding 2 log entries"));
        mock.assert_async().await;
    }

    #[tokio::test]
    #[traced_test]
    async fn test_flush_error_status_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(500)
            .with_body("Internal Server Error")
            .expect(1)
            .create_async()
            .await;

        let buffer = Arc::new(EntryBuffer::new(8));
        fill(&buffer, &["a"]).await;
        let flusher = flusher(server.url(), "mock-token", Arc::clone(&buffer));

        let outcome = flusher.flush(1).await;

        assert!(matches!(
            outcome,
            FlushOutcome::Sent {
                entries: 1,
                status: StatusCode::INTERNAL_SERVER_ERROR
            }
        ));
        assert!(buffer.is_empty());
        assert!(logs_contain("Internal Server Error"));

        // A second flush has nothing left to send
        assert!(matches!(flusher.flush(1).await, FlushOutcome::Empty));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_flush_transport_error_is_swallowed() {
        // Nothing listens on the discard port
        let buffer = Arc::new(EntryBuffer::new(8));
        fill(&buffer, &["a", "b"]).await;
        let flusher = flusher("http://127.0.0.1:9".to_string(), "tok", Arc::clone(&buffer));

        let outcome = flusher.flush(1).await;

        assert!(matches!(
            outcome,
            FlushOutcome::Failed {
                entries: 2,
                error: ShippingError::Destination(..)
            }
        ));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_flush_invalid_token_fails_before_sending() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .expect(0)
            .create_async()
            .await;

        let buffer = Arc::new(EntryBuffer::new(8));
        fill(&buffer, &["a"]).await;
        let flusher = flusher(server.url(), "bad\ntoken", Arc::clone(&buffer));

        let outcome = flusher.flush(1).await;

        assert!(matches!(
            outcome,
            FlushOutcome::Failed {
                entries: 1,
                error: ShippingError::Payload(_)
            }
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_flush_with_compression() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("content-encoding", "zstd")
            .match_header("content-type", "application/json")
            .with_status(202)
            .expect(1)
            .create_async()
            .await;

        let buffer = Arc::new(EntryBuffer::new(8));
        fill(&buffer, &["{}", "{}"]).await;
        let flusher = Flusher::new(FlusherConfig {
            token: AuthToken::new("mock-token"),
            buffer: Arc::clone(&buffer),
            endpoint: server.url(),
            https_proxy: None,
            compression_level: Some(3),
        });

        let outcome = flusher.flush(1).await;

        mock.assert_async().await;
        assert!(matches!(outcome, FlushOutcome::Sent { entries: 2, .. }));
    }

    #[tokio::test]
    async fn test_flush_batch_sends_given_entries() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body("[x,y]")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let buffer = Arc::new(EntryBuffer::new(8));
        let flusher = flusher(server.url(), "mock-token", buffer);

        let outcome = flusher.flush_batch(vec![entry("x"), entry("y")], 1).await;

        mock.assert_async().await;
        assert!(matches!(outcome, FlushOutcome::Sent { entries: 2, .. }));
    }

    #[test]
    fn test_invalid_proxy_falls_back_to_direct_client() {
        let client = get_client(Some("not a proxy url"));
        assert!(client.post("https://example.com").build().is_ok());
    }
}
