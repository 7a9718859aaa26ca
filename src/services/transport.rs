// src/services/transport.rs

//! Network fetch with primary/fallback methods and streaming validation.
//!
//! The body is never buffered whole before it is checked: the first
//! `sniff_bytes` are inspected for block pages and error documents, the
//! running total is held against the payload cap, and every chunk read is
//! bounded by the stall timeout and raced against cancellation.

use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{ContentError, FetchError, Result, TransportError};
use crate::models::{FetchConfig, RequestMethod};
use crate::utils::fs::ensure_parent;
use crate::utils::http::create_async_client;

type FetchResult<T> = std::result::Result<T, FetchError>;

/// Where accepted bytes go.
enum PayloadSink<'a> {
    Memory(&'a mut Vec<u8>),
    File(&'a mut tokio::fs::File),
}

impl PayloadSink<'_> {
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Memory(buf) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
            Self::File(file) => file.write_all(bytes).await,
        }
    }

    /// Discard whatever a failed attempt wrote.
    async fn reset(&mut self) -> std::io::Result<()> {
        match self {
            Self::Memory(buf) => buf.clear(),
            Self::File(file) => {
                file.flush().await?;
                file.set_len(0).await?;
                file.seek(SeekFrom::Start(0)).await?;
            }
        }
        Ok(())
    }
}

/// Classify a body prefix. `None` means it may be a catalog.
pub fn sniff(prefix: &[u8]) -> Option<ContentError> {
    let text = String::from_utf8_lossy(prefix).to_ascii_lowercase();
    let text = text.trim_start_matches('\u{feff}').trim_start();

    if text.contains("<html") || text.contains("<!doctype") {
        return Some(ContentError::BlockedResponse);
    }
    if text.starts_with('{') && text.contains("\"error\"") {
        return Some(ContentError::MalformedPayload);
    }
    None
}

/// HTTP transport shared by every worker of a run.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    config: FetchConfig,
}

impl Transport {
    /// Create a transport with its own client.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Ok(Self::with_client(create_async_client(config)?, config))
    }

    pub fn with_client(client: reqwest::Client, config: &FetchConfig) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch a payload into memory.
    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> FetchResult<Vec<u8>> {
        let mut buf = Vec::new();
        let floor = self.config.min_payload_bytes;
        self.run(url, &mut PayloadSink::Memory(&mut buf), floor, cancel)
            .await?;
        Ok(buf)
    }

    /// Stream a payload into `path`, returning the byte count.
    ///
    /// On error the file at `path` may hold partial data; callers write to a
    /// temporary path and remove it.
    pub async fn download(
        &self,
        url: &str,
        path: &Path,
        cancel: &CancellationToken,
    ) -> FetchResult<u64> {
        self.download_with_floor(url, path, self.config.min_payload_bytes, cancel)
            .await
    }

    /// Stream a link document into `path`, floored at `min_document_bytes`.
    pub async fn download_document(
        &self,
        url: &str,
        path: &Path,
        cancel: &CancellationToken,
    ) -> FetchResult<u64> {
        self.download_with_floor(url, path, self.config.min_document_bytes, cancel)
            .await
    }

    async fn download_with_floor(
        &self,
        url: &str,
        path: &Path,
        floor: u64,
        cancel: &CancellationToken,
    ) -> FetchResult<u64> {
        ensure_parent(path).await?;
        let mut file = tokio::fs::File::create(path).await?;
        let size = self
            .run(url, &mut PayloadSink::File(&mut file), floor, cancel)
            .await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(size)
    }

    /// Primary attempt, then one fallback with the alternate method.
    ///
    /// When both fail the primary attempt's error is reported.
    async fn run(
        &self,
        url: &str,
        sink: &mut PayloadSink<'_>,
        floor: u64,
        cancel: &CancellationToken,
    ) -> FetchResult<u64> {
        let primary = self.config.primary_method;
        let first = match self.attempt(primary, url, sink, floor, cancel).await {
            Ok(size) => return Ok(size),
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
            Err(e) => e,
        };

        let fallback = primary.alternate();
        log::debug!(
            "{:?} {} failed ({}), retrying with {:?}",
            primary,
            url,
            first,
            fallback
        );

        let delay = Duration::from_millis(self.config.fallback_delay_ms);
        tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        sink.reset().await?;
        match self.attempt(fallback, url, sink, floor, cancel).await {
            Ok(size) => Ok(size),
            Err(FetchError::Cancelled) => Err(FetchError::Cancelled),
            Err(second) => {
                log::debug!("{:?} {} failed as well: {}", fallback, url, second);
                Err(first)
            }
        }
    }

    async fn attempt(
        &self,
        method: RequestMethod,
        url: &str,
        sink: &mut PayloadSink<'_>,
        floor: u64,
        cancel: &CancellationToken,
    ) -> FetchResult<u64> {
        let request = match method {
            RequestMethod::Get => self.client.get(url),
            RequestMethod::Post => self.client.post(url),
        };
        let stall = Duration::from_secs(self.config.stall_timeout_secs);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = tokio::time::timeout(stall, request.send()) => match result {
                Err(_) => return Err(TransportError::Timeout.into()),
                Ok(Err(e)) => return Err(classify_request_error(&e).into()),
                Ok(Ok(response)) => response,
            },
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(TransportError::HttpStatus(status.as_u16()).into());
        }

        let limit = self.config.max_payload_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(ContentError::OversizedPayload { limit }.into());
        }

        let sniff_len = self.config.sniff_bytes;
        let mut prefix: Vec<u8> = Vec::with_capacity(sniff_len);
        let mut sniffed = false;
        let mut total: u64 = 0;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                next = tokio::time::timeout(stall, stream.next()) => next,
            };
            let chunk = match next {
                Err(_) => return Err(TransportError::Timeout.into()),
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(classify_request_error(&e).into()),
                Ok(Some(Ok(chunk))) => chunk,
            };

            total += chunk.len() as u64;
            if total > limit {
                return Err(ContentError::OversizedPayload { limit }.into());
            }

            if sniffed {
                sink.write(&chunk).await?;
                continue;
            }
            prefix.extend_from_slice(&chunk);
            if prefix.len() >= sniff_len {
                check_prefix(&prefix, sniff_len)?;
                sink.write(&prefix).await?;
                prefix = Vec::new();
                sniffed = true;
            }
        }

        if !sniffed {
            check_prefix(&prefix, sniff_len)?;
            sink.write(&prefix).await?;
        }

        if total < floor {
            return Err(ContentError::EmptyPayload { bytes: total }.into());
        }
        Ok(total)
    }
}

fn check_prefix(prefix: &[u8], sniff_len: usize) -> FetchResult<()> {
    let head = &prefix[..prefix.len().min(sniff_len)];
    match sniff(head) {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

/// Map a client error onto the transport taxonomy.
fn classify_request_error(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        return TransportError::Timeout;
    }

    let detail = error_chain(error);
    if error.is_connect() {
        let lower = detail.to_ascii_lowercase();
        if lower.contains("dns") || lower.contains("lookup") || lower.contains("resolve") {
            return TransportError::DnsFailure(detail);
        }
        return TransportError::Connect(detail);
    }
    if let Some(status) = error.status() {
        return TransportError::HttpStatus(status.as_u16());
    }
    TransportError::Request(detail)
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_markup() {
        assert_eq!(
            sniff(b"<!DOCTYPE html><html><head>"),
            Some(ContentError::BlockedResponse)
        );
        assert_eq!(
            sniff(b"\n  <HTML><body>Just a moment...</body>"),
            Some(ContentError::BlockedResponse)
        );
    }

    #[test]
    fn test_sniff_error_document() {
        assert_eq!(
            sniff(br#"{"error": "invalid token"}"#),
            Some(ContentError::MalformedPayload)
        );
        assert_eq!(sniff(br#"{"expiresAt": "2026-01-01 00:00:00"}"#), None);
    }

    #[test]
    fn test_sniff_catalog() {
        assert_eq!(sniff(b"#EXTM3U\n#EXTINF:-1,News\nhttp://h/1.ts\n"), None);
        assert_eq!(sniff("\u{feff}#EXTM3U".as_bytes()), None);
    }

    #[test]
    fn test_check_prefix_only_inspects_head() {
        let mut body = b"#EXTM3U\n".to_vec();
        body.extend(std::iter::repeat_n(b'a', 600));
        body.extend_from_slice(b"<html>");
        assert!(check_prefix(&body, 512).is_ok());
        assert!(check_prefix(&body, 1024).is_err());
    }

    #[tokio::test]
    async fn test_sink_reset_truncates_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("payload");
        let mut file = tokio::fs::File::create(&path).await.unwrap();
        let mut sink = PayloadSink::File(&mut file);

        sink.write(b"partial body").await.unwrap();
        sink.reset().await.unwrap();
        sink.write(b"fresh").await.unwrap();
        file.flush().await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"fresh");
    }
}
