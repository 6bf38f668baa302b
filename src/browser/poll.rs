use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollError {
    #[error("deadline elapsed")]
    TimedOut,

    #[error("cancelled")]
    Cancelled,
}

/// Repeats a probe at a fixed interval until it yields a value, the
/// deadline passes, or the token is cancelled.
///
/// The probe always runs at least once, so a zero timeout still performs
/// a single check.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub async fn until<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut probe: F,
    ) -> Result<T, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let deadline = Instant::now() + self.timeout;

        loop {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }

            if let Some(value) = probe().await {
                return Ok(value);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(PollError::TimedOut);
            }

            let nap = self.interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

/// Sleeps for `duration` unless the token is cancelled first.
pub async fn sleep(duration: Duration, cancel: &CancellationToken) -> Result<(), PollError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(PollError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
