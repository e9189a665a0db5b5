use std::future::Future;

use tokio::time::sleep;
use tracing::warn;

use crate::cancel::CancelToken;
use crate::config::RetryPolicy;
use crate::{Error, Result};

/// Run `op` until it succeeds, fails terminally, or the attempt budget is
/// spent. Only errors for which [`Error::is_retryable`] holds are retried.
pub async fn with_backoff<T, F, Fut>(
    what: &str,
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        attempt += 1;
        let outcome = tokio::select! {
            outcome = op() => outcome,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(%e, attempt, ?delay, "{what} failed, retrying");
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
            Err(e) => return Err(e),
        }
    }
}
