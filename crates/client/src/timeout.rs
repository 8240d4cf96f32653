//! Deadline wrapper for provider calls.
//!
//! The wrapped operation runs on its own task. When the deadline passes the
//! caller gets a [`TimeoutError`] right away while the operation keeps running
//! to completion in the background; its result is dropped. A timeout therefore
//! means "outcome unknown", not "did not happen".

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{description} timed out after {}ms", .after.as_millis())]
pub struct TimeoutError {
    pub description: String,
    pub after: Duration,
}

impl TimeoutError {
    pub fn after_ms(&self) -> u64 {
        u64::try_from(self.after.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Run `operation` with a deadline.
pub async fn with_timeout<F, T>(operation: F, after: Duration, description: &str) -> Result<T, TimeoutError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    with_timeout_notify(operation, after, description, |_| {}).await
}

/// Run `operation` with a deadline, calling `on_timeout` if it expires.
pub async fn with_timeout_notify<F, T>(
    operation: F,
    after: Duration,
    description: &str,
    on_timeout: impl FnOnce(&TimeoutError),
) -> Result<T, TimeoutError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    // Dropping the JoinHandle detaches the task; it is never aborted.
    let handle = tokio::spawn(operation);

    match tokio::time::timeout(after, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_error)) if join_error.is_panic() => {
            std::panic::resume_unwind(join_error.into_panic())
        }
        Ok(Err(_)) => {
            // Runtime shutting down underneath us; outcome unknown.
            Err(TimeoutError {
                description: description.to_string(),
                after,
            })
        }
        Err(_) => {
            let err = TimeoutError {
                description: description.to_string(),
                after,
            };
            crate::log_warn!("{}", err);
            on_timeout(&err);
            Err(err)
        }
    }
}
