//! HTTP client for downloading source images

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, Proxy};
use std::error::Error as _;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::FetchSettings;
use crate::pipeline::{Fetch, FetchError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),

    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub max_body_bytes: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::from(&FetchSettings::default())
    }
}

impl From<&FetchSettings> for HttpConfig {
    fn from(settings: &FetchSettings) -> Self {
        Self {
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            request_timeout: Duration::from_millis(settings.request_timeout_ms),
            user_agent: settings.user_agent.clone(),
            max_body_bytes: settings.max_body_bytes.map(|b| b.as_u64()),
        }
    }
}

/// Single-shot image downloader; retrying is the caller's job
pub struct HttpFetcher {
    client: Client,
    config: HttpConfig,
}

impl HttpFetcher {
    pub fn new(config: HttpConfig, proxy_url: Option<&str>) -> Result<Self, ClientError> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(url) = proxy_url {
            let proxy = Proxy::all(url).map_err(|e| ClientError::InvalidProxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_settings(settings: &FetchSettings) -> Result<Self, ClientError> {
        Self::new(HttpConfig::from(settings), settings.proxy.as_deref())
    }

    async fn download(&self, url: &str) -> Result<Bytes, FetchError> {
        debug!(url, "Starting download");

        let mut response = self.client.get(url).send().await.map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let Some(limit) = self.config.max_body_bytes else {
            let bytes = response.bytes().await.map_err(map_reqwest)?;
            debug!(url, size = bytes.len(), "Download completed");
            return Ok(bytes);
        };

        if response.content_length().is_some_and(|len| len > limit) {
            return Err(FetchError::BodyTooLarge { limit });
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(map_reqwest)? {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(FetchError::BodyTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url, size = body.len(), "Download completed");
        Ok(body.freeze())
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.download(url).await
    }
}

fn map_reqwest(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout;
    }
    if err.is_builder() {
        return FetchError::InvalidUrl(err.to_string());
    }
    if let Some(kind) = io_error_kind(&err) {
        if kind == io::ErrorKind::TimedOut {
            return FetchError::Timeout;
        }
        return FetchError::Connection(kind);
    }

    // A body cut short mid-stream is the reqwest face of an unexpected EOF
    FetchError::Transport {
        message: err.to_string(),
        temporary: err.is_body() || err.is_decode(),
    }
}

/// First `io::Error` in the source chain, if any
fn io_error_kind(err: &reqwest::Error) -> Option<io::ErrorKind> {
    let mut source = err.source();
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = current.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ErrorKind;

    fn fetcher(max_body_bytes: Option<u64>) -> HttpFetcher {
        let config = HttpConfig {
            request_timeout: Duration::from_secs(5),
            max_body_bytes,
            ..HttpConfig::default()
        };
        HttpFetcher::new(config, None).unwrap()
    }

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("imagepress/"));
        assert_eq!(config.max_body_bytes, None);
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/a.jpg")
            .with_status(200)
            .with_body(b"raw image bytes")
            .create_async()
            .await;

        let bytes = fetcher(None)
            .fetch(&format!("{}/a.jpg", server.url()))
            .await
            .unwrap();

        assert_eq!(bytes, Bytes::from_static(b"raw image bytes"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_not_found_is_terminal() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/gone.jpg").with_status(404).create_async().await;

        let err = fetcher(None)
            .fetch(&format!("{}/gone.jpg", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 404 }));
        assert_eq!(err.kind(), ErrorKind::TerminalTransport);
    }

    #[tokio::test]
    async fn test_service_unavailable_is_transient() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/busy.jpg").with_status(503).create_async().await;

        let err = fetcher(None)
            .fetch(&format!("{}/busy.jpg", server.url()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransientTransport);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/big.jpg")
            .with_status(200)
            .with_body(vec![0u8; 2048])
            .create_async()
            .await;

        let err = fetcher(Some(1024))
            .fetch(&format!("{}/big.jpg", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::BodyTooLarge { limit: 1024 }));
        assert_eq!(err.kind(), ErrorKind::TerminalContent);
    }
}
