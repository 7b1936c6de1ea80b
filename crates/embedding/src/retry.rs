//! Retry logic with exponential backoff for transient gateway failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; the default budget is three tries
    /// total.
    pub max_retries: u32,
    /// Base delay between retries (exponentially increased).
    pub base_delay: Duration,
    /// Cap on the backoff delay.
    pub max_delay: Duration,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Result of a retried operation.
#[derive(Debug, Clone)]
pub struct RetryResult<T> {
    pub result: Result<T, String>,
    /// Attempts made (1 = no retries needed).
    pub attempts: u32,
    pub total_duration: Duration,
}

impl<T> RetryResult<T> {
    pub fn into_result(self) -> Result<T, String> {
        self.result
    }
}

/// Execute `operation` with bounded retries. Non-retryable errors abort
/// immediately instead of burning the budget.
pub fn execute_with_retry<T, F>(config: &RetryConfig, mut operation: F) -> RetryResult<T>
where
    F: FnMut(u32) -> Result<T, String>,
{
    let start = std::time::Instant::now();
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        match operation(attempt) {
            Ok(value) => {
                return RetryResult {
                    result: Ok(value),
                    attempts: attempt + 1,
                    total_duration: start.elapsed(),
                };
            }
            Err(error) => {
                let retryable = is_retryable_error(&error);
                last_error = Some(error);
                if !retryable {
                    return RetryResult {
                        result: Err(last_error.unwrap_or_default()),
                        attempts: attempt + 1,
                        total_duration: start.elapsed(),
                    };
                }
                if attempt < config.max_retries {
                    std::thread::sleep(calculate_delay(config, attempt));
                }
            }
        }
    }

    RetryResult {
        result: Err(last_error.unwrap_or_else(|| "all retries failed".to_string())),
        attempts: config.max_retries + 1,
        total_duration: start.elapsed(),
    }
}

fn calculate_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.base_delay.as_millis() as u64;
    let exponential = base.saturating_mul(2_u64.saturating_pow(attempt));
    let delay = exponential.min(config.max_delay.as_millis() as u64);

    if config.jitter {
        // 0-50% random jitter
        let jitter = fastrand::u64(0..=delay / 2 + 1);
        Duration::from_millis(delay + jitter)
    } else {
        Duration::from_millis(delay)
    }
}

/// Whether an error message names a transient fault worth retrying.
pub fn is_retryable_error(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("reset")
        || error_lower.contains("temporarily")
        || error_lower.contains("unavailable")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("504")
        || error_lower.contains("429")
    {
        return true;
    }

    if error_lower.contains("400")
        || error_lower.contains("401")
        || error_lower.contains("403")
        || error_lower.contains("404")
        || error_lower.contains("invalid")
        || error_lower.contains("dimension")
    {
        return false;
    }

    // Unknown errors default to retryable.
    true
}
