//! Exponential backoff for transient HTTP failures (rate limits, 5xx).

use std::future::Future;
use std::time::Duration;

/// A failed request attempt
#[derive(Debug)]
pub struct AttemptError {
    pub retryable: bool,
    pub message: String,
}

impl AttemptError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
        Self {
            retryable,
            message: format!("HTTP {}: {}", status, body),
        }
    }

    /// Timeouts and connection failures are worth another attempt
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        Self {
            retryable: e.is_timeout() || e.is_connect(),
            message: format!("Network error: {}", e),
        }
    }
}

/// Run `attempt` until it succeeds, fails with a non-retryable error, or
/// `max_retries` retries are used up. The delay doubles after every retry.
pub async fn with_backoff<T, F, Fut>(
    label: &str,
    max_retries: usize,
    initial_delay: Duration,
    mut attempt: F,
) -> std::result::Result<T, AttemptError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let start = std::time::Instant::now();
    let mut retries = 0;
    let mut delay = initial_delay;

    loop {
        match attempt().await {
            Ok(value) => {
                log::debug!("{} took {:?} (attempt {})", label, start.elapsed(), retries + 1);
                return Ok(value);
            }
            Err(e) if e.retryable && retries < max_retries => {
                log::warn!(
                    "{}: retry {}/{} after error: {}",
                    label,
                    retries + 1,
                    max_retries,
                    e.message
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                retries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicUsize::new(0);
        let result = with_backoff("test", 3, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AttemptError::transient("busy"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: std::result::Result<(), _> =
            with_backoff("test", 5, Duration::from_millis(1), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptError::fatal("bad request")) }
            })
            .await;
        assert_eq!(result.unwrap_err().message, "bad request");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let result: std::result::Result<(), _> =
            with_backoff("test", 2, Duration::from_millis(1), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptError::transient("503")) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_status_classification() {
        assert!(AttemptError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "").retryable);
        assert!(AttemptError::from_status(reqwest::StatusCode::BAD_GATEWAY, "").retryable);
        assert!(!AttemptError::from_status(reqwest::StatusCode::UNAUTHORIZED, "").retryable);
    }
}
