//! Gateway configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;
use crate::retry::RetryConfig;

/// Runtime configuration for the HTTP embedding gateway.
///
/// Constructed once at startup, validated, and injected into the gateway;
/// the dimension recorded here is the system-wide constant `D` every
/// stored vector is checked against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding endpoint; receives `{"model", "inputs": [...]}` and must
    /// answer `{"embeddings": [[f32; D], ...]}`.
    pub api_url: String,
    /// Optional liveness endpoint. When absent, `health()` embeds a probe
    /// string, which doubles as a startup dimension check.
    pub health_url: Option<String>,
    /// Authorization header value (e.g. `"Bearer tok_xxx"`).
    pub api_auth_header: Option<String>,
    /// Friendly model label forwarded to the service.
    pub model_name: String,
    /// The fixed vector dimension `D`.
    pub dimension: usize,
    /// Overall per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Bounded-retry policy for transient faults.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8750/v1/embed".into(),
            health_url: None,
            api_auth_header: None,
            model_name: "bge-base-en-v1.5".into(),
            dimension: 768,
            timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl EmbeddingConfig {
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Startup validation; a zero dimension or empty endpoint is fatal.
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.api_url.trim().is_empty() {
            return Err(EmbeddingError::InvalidConfig("api_url is empty".into()));
        }
        if self.dimension == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "dimension must be greater than zero".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
