//! Bounded, cancellable polling for external readiness

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Result of [`poll_until`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut,
    Cancelled,
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }
}

/// Probe every `interval` until it yields a value, `timeout` elapses, or
/// `cancel` fires.
///
/// The first probe runs immediately. `probe` returns `None` while the
/// resource is not ready. A `timeout` too large to be represented as an
/// instant polls without a deadline.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
    mut probe: F,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now().checked_add(timeout);

    loop {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }

        if let Some(value) = probe().await {
            return PollOutcome::Ready(value);
        }

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return PollOutcome::TimedOut;
                }
                interval.min(deadline - now)
            }
            None => interval,
        };

        tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = tokio::time::sleep(pause) => {}
        }
    }
}
