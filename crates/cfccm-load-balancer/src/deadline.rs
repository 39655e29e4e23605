//! Deadline and cancellation for one reconciliation
//!
//! The wrapped future is dropped when either fires, which aborts the HTTP
//! request in flight. Remaining steps never run; the next reconciliation
//! re-reads remote state and picks up where this one stopped.

use std::future::Future;
use std::time::Duration;

use cfccm_common::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Time limit plus shutdown signal applied to provider calls
#[derive(Clone, Debug)]
pub struct CallLimits {
    timeout: Duration,
    cancel: CancellationToken,
}

impl CallLimits {
    /// Limits with the given timeout, cancelled through `cancel`
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    /// Run `fut`, failing with `Cancelled` or `DeadlineExceeded` if it does
    /// not finish in time
    pub async fn run<F, T>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled(operation));
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!(operation, "cancelled");
                Err(Error::cancelled(operation))
            }
            result = tokio::time::timeout(self.timeout, fut) => match result {
                Ok(inner) => inner,
                Err(_) => {
                    warn!(operation, timeout_secs = self.timeout.as_secs(), "deadline exceeded");
                    Err(Error::deadline_exceeded(operation))
                }
            },
        }
    }
}
