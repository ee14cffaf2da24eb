//! Caller context: cancellation and deadline propagation
//!
//! A [`CallContext`] travels with every outbound call. It combines a
//! [`CancellationToken`] with an optional deadline; derived contexts share
//! the parent's cancellation and can only tighten its deadline.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ContextError;

/// Cancellation and deadline scope for one logical call
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Root context with no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Child context that expires after `timeout`, or earlier if this
    /// context's own deadline comes first
    ///
    /// A timeout too large to represent as an instant adds no deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Child context with the earlier of `deadline` and this context's
    /// deadline
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Self { token: self.token.child_token(), deadline: Some(deadline) }
    }

    /// Child context sharing this context's deadline
    pub fn child(&self) -> Self {
        Self { token: self.token.child_token(), deadline: self.deadline }
    }

    /// Cancel this context and every context derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Effective deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Why this context is done, or `None` while it is still live
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            Some(ContextError::Cancelled)
        } else if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Whether the context was cancelled or its deadline passed
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.token.cancelled() => ContextError::Cancelled,
                () = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }
}
