//! Cancellation and deadline scope for a single reconcile invocation.
//!
//! Every remote call a reconciler makes runs through [`Invocation::run`],
//! which races the call against the operator's shutdown token and the
//! invocation deadline. An interrupted call yields [`Error::Cancelled`] or
//! [`Error::DeadlineExceeded`], and callers must not persist a phase
//! transition for it.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::Error;

/// Cancellation token plus deadline for one reconcile
#[derive(Clone, Debug)]
pub struct Invocation {
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl Invocation {
    /// Start an invocation that expires `timeout` from now
    pub fn new(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    /// Fail fast if the invocation is already cancelled or expired
    pub fn check(&self, context: &str) -> Result<(), Error> {
        if self.token.is_cancelled() {
            return Err(Error::cancelled(context));
        }
        if Instant::now() >= self.deadline {
            return Err(Error::deadline_exceeded(context, self.timeout));
        }
        Ok(())
    }

    /// Run `fut` unless cancellation or the deadline arrives first
    ///
    /// The inner result is returned untouched; the outer result reports
    /// interruption.
    pub async fn run<F, T>(&self, context: &str, fut: F) -> Result<T, Error>
    where
        F: Future<Output = T>,
    {
        self.check(context)?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::cancelled(context)),
            _ = tokio::time::sleep_until(self.deadline) => {
                Err(Error::deadline_exceeded(context, self.timeout))
            }
            out = fut => Ok(out),
        }
    }

    /// Whether the invocation has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}
