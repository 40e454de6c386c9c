//! Operation Context
//!
//! Carries request metadata through the aggregator: a correlation id for
//! tracing, plus the caller's deadline and cancellation signal.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Why a guarded operation did not run to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupted {
    #[error("operation cancelled by caller")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Context for an operation, used for tracing and cancellation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Correlation ID for request tracing
    pub correlation_id: Option<Uuid>,

    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl OperationContext {
    /// Create a context with no deadline and a fresh cancellation token
    pub fn new() -> Self {
        Self {
            correlation_id: None,
            deadline: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Set the deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Tie this context to an external cancellation signal
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Run `operation` until it completes, the caller cancels, or the deadline passes.
    ///
    /// On interruption the operation future is dropped, aborting whatever
    /// HTTP call or backoff sleep it was parked on.
    pub async fn guard<F>(&self, operation: F) -> Result<F::Output, Interrupted>
    where
        F: Future,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(Interrupted::Cancelled),
            _ = deadline => Err(Interrupted::DeadlineExceeded),
            output = operation => Ok(output),
        }
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
