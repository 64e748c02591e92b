//! Backoff schedule and error classification for transfer retries
//!
//! [`Backoff`] is the delay schedule shared by every retrying caller. Part
//! workers drive it in their own unbounded loop, where only cancellation stops
//! them. [`retry_bounded`] wraps it for operations that must eventually give
//! up, such as the length probe that precedes a ranged transfer.
//!
//! # Example
//!
//! ```no_run
//! use sector_sync::config::RetryConfig;
//! use sector_sync::retry::retry_bounded;
//!
//! # async fn example(client: reqwest::Client) -> sector_sync::Result<()> {
//! let config = RetryConfig::default();
//! let status = retry_bounded(&config, "platform ping", || async {
//!     Ok::<_, sector_sync::Error>(client.head("https://platform.example.com").send().await?.status())
//! })
//! .await?;
//! # let _ = status;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, TransferError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server busy, connection reset) should return `true`.
/// Permanent failures (bad configuration, missing range support, corrupt data) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            // Server busy or overloaded
            Error::Transfer(TransferError::HttpStatus { status, .. }) => {
                *status >= 500 || *status == 429 || *status == 408
            }
            Error::Transfer(TransferError::LengthMismatch { .. }) => true,
            Error::Transfer(TransferError::RangeUnsupported { .. }) => false,
            Error::Config { .. }
            | Error::Unpack { .. }
            | Error::Declare { .. }
            | Error::Platform(_)
            | Error::Serialization(_)
            | Error::Cancelled
            | Error::Other(_) => false,
        }
    }
}

/// Exponential backoff schedule
///
/// Each call to [`next_delay`](Backoff::next_delay) returns the current delay
/// (jittered if configured) and advances the schedule, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    current: Duration,
}

impl Backoff {
    /// Start a schedule at `config.initial_delay`
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            config: config.clone(),
            current: config.initial_delay.min(config.max_delay),
        }
    }

    /// Delay to wait before the next retry
    pub fn next_delay(&mut self) -> Duration {
        let delay = if self.config.jitter {
            add_jitter(self.current)
        } else {
            self.current
        };

        // A product that is negative, NaN or out of range pins the schedule at the cap
        let next = Duration::try_from_secs_f64(
            self.current.as_secs_f64() * self.config.backoff_multiplier,
        )
        .unwrap_or(self.config.max_delay);
        self.current = next.min(self.config.max_delay);

        delay
    }

    /// Restart the schedule after a success
    pub fn reset(&mut self) {
        self.current = self.config.initial_delay.min(self.config.max_delay);
    }
}

/// Run `operation` until it succeeds, fails permanently, or has been retried
/// `config.max_attempts` times
///
/// `label` names the operation in logs. Delays follow [`Backoff`]. The last
/// error is returned unchanged.
pub async fn retry_bounded<F, Fut, T, E>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = Backoff::new(config);
    let mut retries = 0;

    loop {
        let e = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::debug!(label, retries, "Recovered after retrying");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !e.is_retryable() || retries >= config.max_attempts {
            tracing::warn!(label, retries, retryable = e.is_retryable(), error = %e, "Giving up");
            return Err(e);
        }

        retries += 1;
        let delay = backoff.next_delay();
        tracing::debug!(label, retries, delay_ms = delay.as_millis(), error = %e, "Retrying");
        tokio::time::sleep(delay).await;
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay,
/// so the actual delay lands between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::try_from_secs_f64(jittered_secs).unwrap_or(delay)
}
