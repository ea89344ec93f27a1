use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use rand::Rng;

/// Configuration for retry behavior with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Schedule for releasing a FUSE mount that is still in use: a few
    /// short waits for open handles to close.
    pub fn unmount() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
            ..Default::default()
        }
    }

    /// Calculate backoff duration for a given attempt
    fn backoff_duration(&self, attempt: u32) -> Duration {
        let base_duration = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        
        let duration_ms = base_duration.min(self.max_backoff.as_millis() as f64) as u64;
        let mut duration = Duration::from_millis(duration_ms);

        // Add jitter: random value between 0% and 25% of duration
        if self.jitter {
            let jitter_ms = rand::thread_rng().gen_range(0..=(duration_ms / 4));
            duration += Duration::from_millis(jitter_ms);
        }

        duration
    }
}

/// Trait to determine if an error is retryable
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for borgpack_core::Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Interrupted syscalls and the like
            borgpack_core::Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            // A mount still in use, or a lock held by a finishing process
            borgpack_core::Error::RepositoryFailure { diagnostic, .. } => {
                let diagnostic = diagnostic.to_ascii_lowercase();
                diagnostic.contains("busy")
                    || diagnostic.contains("temporarily unavailable")
                    || diagnostic.contains("try again")
            }
            // Missing tools, bad input and corruption never heal by waiting
            _ => false,
        }
    }
}

/// Retry a future operation with exponential backoff
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if !error.is_retryable() {
                    debug!(
                        operation = operation_name,
                        error = %error,
                        "Error is not retryable, failing immediately"
                    );
                    return Err(error);
                }

                attempt += 1;
                if attempt >= config.max_attempts {
                    warn!(
                        operation = operation_name,
                        max_attempts = config.max_attempts,
                        error = %error,
                        "Operation failed after all retry attempts"
                    );
                    return Err(error);
                }

                let backoff = config.backoff_duration(attempt - 1);
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = config.max_attempts,
                    backoff_ms = backoff.as_millis(),
                    error = %error,
                    "Operation failed, retrying after backoff"
                );
                sleep(backoff).await;
            }
        }
    }
}
