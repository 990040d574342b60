//! Configuration for readers, backends and the block cache.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Configuration for the grid store read path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Size of one block cache block in bytes.
    pub block_size: u64,

    /// Number of block cache slots.
    pub block_count: usize,

    /// Upper bound for one backend request issued by `read_concurrent`.
    pub io_size_max: u64,

    /// Number of backend requests `read_concurrent` keeps in flight.
    pub max_concurrent_requests: usize,

    /// HTTP backend settings.
    pub http: HttpBackendConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            block_size: 64 * 1024,
            block_count: 1024,
            io_size_max: 1024 * 1024,
            max_concurrent_requests: 8,
            http: HttpBackendConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(StoreError::Config("block_size must be > 0".to_string()));
        }

        if self.block_count == 0 {
            return Err(StoreError::Config("block_count must be > 0".to_string()));
        }

        if self.io_size_max == 0 {
            return Err(StoreError::Config("io_size_max must be > 0".to_string()));
        }

        if self.max_concurrent_requests == 0 {
            return Err(StoreError::Config(
                "max_concurrent_requests must be > 0".to_string(),
            ));
        }

        self.http.validate()
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StoreError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Memory held by a block cache built from this configuration.
    pub fn block_cache_size_bytes(&self) -> u64 {
        self.block_size * self.block_count as u64
    }
}

/// Timeouts and retry policy for ranged HTTP reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpBackendConfig {
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Maximum retry attempts for transient failures.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles each retry).
    pub initial_retry_delay_ms: u64,

    /// Maximum retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 3,
            initial_retry_delay_ms: 200,
            max_retry_delay_ms: 5_000,
        }
    }
}

impl HttpBackendConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(StoreError::Config(
                "request_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.initial_retry_delay_ms > self.max_retry_delay_ms {
            return Err(StoreError::Config(
                "initial_retry_delay_ms must not exceed max_retry_delay_ms".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Delay before retry number `attempt` (1-based), with exponential backoff.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let delay = self.initial_retry_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_retry_delay_ms))
    }
}
