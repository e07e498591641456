//! Async utilities for deadline- and cancellation-aware futures.
//!
//! Provides the `OrInterruptExt` trait, which races a future against a
//! `tokio::time::Instant` deadline and, optionally, a tokio-util
//! `CancellationToken`. When the race is lost the future is dropped, so any
//! in-flight I/O it owned is abandoned.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a raced future did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The deadline elapsed before the future completed.
    DeadlineElapsed,
    /// The cancellation token fired before the future completed.
    Cancelled,
}

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeadlineElapsed => write!(f, "deadline elapsed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for Interrupted {}

/// Deadline `timeout` from now.
pub fn deadline_in(timeout: Duration) -> Instant {
    Instant::now() + timeout
}

/// Extension trait for bounding futures by a deadline and a cancellation token.
#[async_trait]
pub trait OrInterruptExt: Sized {
    type Output;

    /// Race this future against `deadline`.
    ///
    /// Returns `Err(Interrupted::DeadlineElapsed)` if the deadline passes first.
    async fn or_deadline(self, deadline: Instant) -> Result<Self::Output, Interrupted>;

    /// Race this future against `deadline` and `token`.
    ///
    /// Cancellation is checked first, so an already-cancelled token wins even
    /// when the deadline has also passed.
    async fn or_interrupt(
        self,
        deadline: Instant,
        token: &CancellationToken,
    ) -> Result<Self::Output, Interrupted>;
}

#[async_trait]
impl<F> OrInterruptExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_deadline(self, deadline: Instant) -> Result<Self::Output, Interrupted> {
        tokio::time::timeout_at(deadline, self)
            .await
            .map_err(|_| Interrupted::DeadlineElapsed)
    }

    async fn or_interrupt(
        self,
        deadline: Instant,
        token: &CancellationToken,
    ) -> Result<Self::Output, Interrupted> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Interrupted::Cancelled),
            res = tokio::time::timeout_at(deadline, self) => {
                res.map_err(|_| Interrupted::DeadlineElapsed)
            }
        }
    }
}
