//! Bounded retry with exponential backoff for action handlers.
//!
//! The engine never retries. Handlers for network-sensitive actions wrap
//! their transient operations in [`with_retry`] instead.

use std::fmt;
use std::thread;
use std::time::Duration;

/// Errors that know whether trying again might help.
pub trait Retryable {
    /// Whether this error is typically transient and worth retrying.
    fn is_retryable(&self) -> bool;
}

/// Backoff settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Default backoff with a custom attempt count (at least one).
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Called before each retry.
pub trait RetryCallback {
    /// `attempt` is the 1-indexed attempt that just failed.
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &dyn fmt::Display, delay: Duration);
}

/// Callback that logs retries as warnings.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &dyn fmt::Display, delay: Duration) {
        log::warn!(
            "Attempt {}/{} failed: {}. Retrying in {:.1}s...",
            attempt,
            max_attempts,
            error,
            delay.as_secs_f64()
        );
    }
}

/// Execute an operation, retrying retryable errors with exponential backoff.
///
/// Non-retryable errors are returned immediately; after the last attempt
/// the last error is returned.
pub fn with_retry<T, E, F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T, E>
where
    E: Retryable + fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() || attempt + 1 >= max_attempts {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt);
                if let Some(cb) = callback {
                    cb.on_retry(attempt + 1, max_attempts, &e, delay);
                }
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Transient => write!(f, "timeout"),
                Self::Fatal => write!(f, "404"),
            }
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Transient)
        }
    }

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(10));
    }

    #[test]
    fn test_non_retryable_error_returns_immediately() {
        let attempts = Cell::new(0);
        let result: Result<(), _> = with_retry(&fast(5), None, || {
            attempts.set(attempts.get() + 1);
            Err(TestError::Fatal)
        });
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_eventual_success() {
        let attempts = Cell::new(0);
        let result = with_retry(&fast(3), None, || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err(TestError::Transient)
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_attempts_are_bounded() {
        struct Counting(Cell<u32>);
        impl RetryCallback for Counting {
            fn on_retry(&self, _: u32, _: u32, _: &dyn fmt::Display, _: Duration) {
                self.0.set(self.0.get() + 1);
            }
        }

        let attempts = Cell::new(0);
        let callback = Counting(Cell::new(0));
        let result: Result<(), _> = with_retry(&fast(3), Some(&callback), || {
            attempts.set(attempts.get() + 1);
            Err(TestError::Transient)
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 3);
        // Called between attempts, not after the last one
        assert_eq!(callback.0.get(), 2);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let attempts = Cell::new(0);
        let _: Result<(), _> = with_retry(&fast(0), None, || {
            attempts.set(attempts.get() + 1);
            Err(TestError::Transient)
        });
        assert_eq!(attempts.get(), 1);
    }
}
