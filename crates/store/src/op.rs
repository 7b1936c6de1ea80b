//! Operation context: cancellation and deadlines.
//!
//! Every write path threads an [`OpCtx`] through its suspension points
//! (filesystem chunk boundaries, store round-trips, embedding calls) and
//! calls [`OpCtx::check`] before each one. A tripped context maps to
//! [`Interrupted::Cancelled`] / [`Interrupted::Timeout`], which callers
//! route through the same cleanup path as any other failure. The catalog
//! commit itself never checks the context - commit is the
//! non-cancellable point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Why an operation stopped early.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation deadline exceeded")]
    Timeout,
}

/// Shared cancellation flag; clone freely, flip once.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Context carried by one operation.
#[derive(Debug, Clone, Default)]
pub struct OpCtx {
    cancel: Option<CancelToken>,
    deadline: Option<Instant>,
}

impl OpCtx {
    /// A context that never interrupts.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Check at a suspension point. Cancellation wins over timeout when
    /// both have tripped.
    pub fn check(&self) -> Result<(), Interrupted> {
        if let Some(token) = &self.cancel {
            if token.is_cancelled() {
                return Err(Interrupted::Cancelled);
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Interrupted::Timeout);
            }
        }
        Ok(())
    }
}
