//! Remote backend issuing ranged HTTP GET requests.
//!
//! Key behaviour:
//! - Every read is a single `Range: bytes=start-end` request
//! - Opening probes the header bytes to learn whether the store exists and
//!   how large it is (from `Content-Range`)
//! - Connection errors and 5xx replies are retried with exponential backoff
//! - Servers that ignore `Range` are rejected

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use tracing::{debug, instrument, warn};

use super::{check_range, resource_key, Backend};
use crate::config::HttpBackendConfig;
use crate::error::{Result, StoreError};
use crate::format::HEADER_SIZE;

/// Outcome of a single request attempt.
enum Failure {
    /// Worth retrying (connection error, 5xx).
    Transient(StoreError),
    /// Retrying cannot help.
    Fatal(StoreError),
}

/// Backend over an HTTP server supporting range requests.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    url: String,
    len: u64,
    key: u64,
    config: HttpBackendConfig,
}

impl HttpBackend {
    /// Build an HTTP client with the configured timeouts.
    pub fn build_client(config: &HttpBackendConfig) -> Result<Client> {
        Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(16)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| StoreError::Config(format!("failed to create HTTP client: {}", e)))
    }

    /// Open a remote store with a fresh client.
    pub async fn open(url: &str, config: HttpBackendConfig) -> Result<Self> {
        let client = Self::build_client(&config)?;
        Self::open_with_client(client, url, config).await
    }

    /// Open a remote store, sharing an existing client.
    ///
    /// Probes the first header-sized range. A missing resource is
    /// `NotFound`; a resource smaller than a store header is `OutOfRange`.
    #[instrument(skip(client, config))]
    pub async fn open_with_client(
        client: Client,
        url: &str,
        config: HttpBackendConfig,
    ) -> Result<Self> {
        let mut backend = Self {
            client,
            url: url.to_string(),
            len: 0,
            key: resource_key(url),
            config,
        };

        let (probe, total) = backend.fetch(0, HEADER_SIZE, true).await?;
        if total < HEADER_SIZE {
            return Err(StoreError::out_of_range(format!(
                "{} is {} bytes, smaller than a store header",
                url, total
            )));
        }
        debug!(url = %url, size = total, probe = probe.len(), "Opened remote store");
        backend.len = total;
        Ok(backend)
    }

    /// The resource URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch a range with retries. With `allow_short`, a reply truncated at
    /// the end of the resource is accepted (used by the open probe).
    async fn fetch(&self, offset: u64, length: u64, allow_short: bool) -> Result<(Bytes, u64)> {
        let mut attempt = 0;
        loop {
            match self.try_fetch(offset, length, allow_short).await {
                Ok(reply) => return Ok(reply),
                Err(Failure::Transient(e)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        url = %self.url,
                        offset,
                        length,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Range request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(Failure::Transient(e)) | Err(Failure::Fatal(e)) => return Err(e),
            }
        }
    }

    async fn try_fetch(
        &self,
        offset: u64,
        length: u64,
        allow_short: bool,
    ) -> std::result::Result<(Bytes, u64), Failure> {
        let last = offset + length - 1;
        let response = self
            .client
            .get(&self.url)
            .header(header::RANGE, format!("bytes={}-{}", offset, last))
            .send()
            .await
            .map_err(|e| Failure::Transient(StoreError::backend(format!("{}: {}", self.url, e))))?;

        let status = response.status();
        match status {
            StatusCode::PARTIAL_CONTENT => {}
            StatusCode::NOT_FOUND => {
                return Err(Failure::Fatal(StoreError::NotFound(self.url.clone())));
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                return Err(Failure::Fatal(StoreError::out_of_range(format!(
                    "{}: range {}-{} not satisfiable",
                    self.url, offset, last
                ))));
            }
            StatusCode::OK => {
                return Err(Failure::Fatal(StoreError::backend(format!(
                    "{}: server does not support range requests",
                    self.url
                ))));
            }
            s if s.is_server_error() => {
                return Err(Failure::Transient(StoreError::backend(format!(
                    "{}: HTTP {}",
                    self.url, s
                ))));
            }
            s => {
                return Err(Failure::Fatal(StoreError::backend(format!(
                    "{}: unexpected HTTP {}",
                    self.url, s
                ))));
            }
        }

        let (start, end, total) = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| {
                Failure::Fatal(StoreError::backend(format!(
                    "{}: missing or invalid Content-Range",
                    self.url
                )))
            })?;

        let expected_end = if allow_short { last.min(total.saturating_sub(1)) } else { last };
        if start != offset || end != expected_end {
            return Err(Failure::Fatal(StoreError::backend(format!(
                "{}: requested bytes {}-{}, server sent {}-{}",
                self.url, offset, last, start, end
            ))));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Failure::Transient(StoreError::backend(format!("{}: {}", self.url, e))))?;
        if body.len() as u64 != end - start + 1 {
            return Err(Failure::Transient(StoreError::backend(format!(
                "{}: short body, {} of {} bytes",
                self.url,
                body.len(),
                end - start + 1
            ))));
        }

        Ok((body, total))
    }
}

/// Parse `bytes start-end/total`.
fn parse_content_range(value: &str) -> Option<(u64, u64, u64)> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    let total = total.trim().parse().ok()?;
    (start <= end && end < total).then_some((start, end, total))
}

#[async_trait]
impl Backend for HttpBackend {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn read(&self, offset: u64, length: u64) -> Result<Bytes> {
        check_range(offset, length, self.len)?;
        if length == 0 {
            return Ok(Bytes::new());
        }
        let (body, total) = self.fetch(offset, length, false).await?;
        if total != self.len {
            return Err(StoreError::backend(format!(
                "{}: resource size changed from {} to {}",
                self.url, self.len, total
            )));
        }
        Ok(body)
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn cache_key(&self) -> u64 {
        self.key
    }
}
