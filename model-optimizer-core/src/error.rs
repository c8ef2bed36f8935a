//! Error handling system
//!
//! Error taxonomy for model loading and optimization, plus a caller-side
//! retry helper. The loader itself never retries.

use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{error, info, warn};

/// Result type for operations
pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Pipeline stage an optimization error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationStage {
    Geometry,
    Texture,
    Lod,
    Inspect,
}

impl std::fmt::Display for OptimizationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Geometry => "geometry",
            Self::Texture => "texture",
            Self::Lod => "lod",
            Self::Inspect => "inspect",
        };
        f.write_str(name)
    }
}

/// Main error type for the model optimizer
///
/// `Clone` so that one load result can be handed to every coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    /// Fetching or decoding the raw asset failed
    #[error("Failed to load model '{url}': {message}")]
    Load { url: String, message: String },

    #[error("Optimization failed: {stage}: {message}")]
    Optimization {
        stage: OptimizationStage,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl OptimizerError {
    /// Create a load error for `url`
    pub fn load<U, M>(url: U, message: M) -> Self
    where
        U: Into<String>,
        M: Into<String>,
    {
        Self::Load {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an optimization error for a pipeline stage
    pub fn optimization<M: Into<String>>(stage: OptimizationStage, message: M) -> Self {
        Self::Optimization {
            stage,
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<F, M>(field: F, message: M) -> Self
    where
        F: Into<String>,
        M: Into<String>,
    {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::Io(_) | Self::Cancelled)
    }

    /// Check if this error suggests retrying
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::Io(_))
    }
}

impl From<std::io::Error> for OptimizerError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<tokio::task::JoinError> for OptimizerError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::TaskJoin(error.to_string())
        }
    }
}

impl From<serde_yaml::Error> for OptimizerError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<serde_json::Error> for OptimizerError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Backoff policy for retrying failed model loads
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: usize,
    /// Wait before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single wait
    pub max_delay: Duration,
    /// Growth factor of the wait per retry
    pub backoff_factor: f64,
    /// Fraction of the wait randomized in both directions, 0.0 to 1.0
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Slower, more jittered policy for remote model hosts
    pub fn for_network() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(20),
            backoff_factor: 2.5,
            jitter: 0.3,
        }
    }

    /// Wait before retry number `retry`; zero for the initial attempt
    pub fn delay_for_attempt(&self, retry: usize) -> Duration {
        let Some(exponent) = retry.checked_sub(1) else {
            return Duration::ZERO;
        };

        let cap = self.max_delay.as_secs_f64();
        let nominal = (self.base_delay.as_secs_f64()
            * self.backoff_factor.powi(exponent.min(i32::MAX as usize) as i32))
        .min(cap);
        let spread = nominal * self.jitter.clamp(0.0, 1.0);
        let offset = rand::random::<f64>().mul_add(2.0, -1.0) * spread;

        Duration::from_secs_f64((nominal + offset).clamp(0.0, cap))
    }
}

/// Caller-side retry loop around a load
///
/// Only errors reporting [`OptimizerError::should_retry`] are retried.
pub struct ErrorRecovery {
    config: RetryConfig,
}

impl ErrorRecovery {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub async fn retry_async<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let started = Instant::now();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("Load succeeded on attempt {} after {:?}", attempt, started.elapsed());
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if attempt >= max_attempts || !error.should_retry() {
                error!("Load failed after {} attempt(s): {}", attempt, error);
                return Err(error);
            }
            let delay = self.config.delay_for_attempt(attempt);
            warn!("Attempt {} failed ({}), next try in {:?}", attempt, error, delay);
            sleep(delay).await;
        }
    }
}

impl Default for ErrorRecovery {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_factor: 2.0,
            jitter: 0.0,
        }
    }

    #[tokio::test]
    async fn test_transient_load_failures_are_retried() {
        let calls = &AtomicUsize::new(0);
        let recovery = ErrorRecovery::new(fast_config(3));

        let scene_name = recovery
            .retry_async(|| async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(OptimizerError::load("model.glb", "connection reset")),
                    _ => Ok("model"),
                }
            })
            .await
            .unwrap();

        assert_eq!(scene_name, "model");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempt_limit() {
        let calls = &AtomicUsize::new(0);
        let recovery = ErrorRecovery::new(fast_config(2));

        let result: Result<()> = recovery
            .retry_async(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OptimizerError::Io("timed out".to_string()))
            })
            .await;

        assert_eq!(result, Err(OptimizerError::Io("timed out".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_for_optimization_errors() {
        let calls = &AtomicUsize::new(0);
        let recovery = ErrorRecovery::new(fast_config(5));

        let result: Result<()> = recovery
            .retry_async(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OptimizerError::optimization(
                    OptimizationStage::Geometry,
                    "index out of range",
                ))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_load_error_names_url() {
        let err = OptimizerError::load("https://cdn.example.com/chair.glb", "404");
        assert!(err.to_string().contains("https://cdn.example.com/chair.glb"));
    }

    #[test]
    fn test_optimization_error_message() {
        let err = OptimizerError::optimization(OptimizationStage::Lod, "bad index");
        assert_eq!(err.to_string(), "Optimization failed: lod: bad index");
        assert!(!err.should_retry());
    }

    #[test]
    fn test_retry_config_delay() {
        let config = RetryConfig {
            jitter: 0.0,
            ..RetryConfig::default()
        };

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert!(config.delay_for_attempt(2) > config.delay_for_attempt(1));
        assert_eq!(config.delay_for_attempt(40), config.max_delay);
    }
}
