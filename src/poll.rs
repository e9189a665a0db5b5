//! Wait for a remote resource to settle.

use std::future::Future;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::config::PollPolicy;
use crate::{Error, RemoteResourceStatus, Result, State};

/// Which states end a wait, and which of those are failures.
#[derive(Debug, Clone, Copy)]
pub struct Terminal<'a> {
    pub success: &'a [State],
    pub failure: &'a [State],
}

impl Terminal<'_> {
    /// Cluster creation settles on RUNNING or ERROR.
    pub const CLUSTER_CREATED: Terminal<'static> = Terminal {
        success: &[State::Running],
        failure: &[State::Error],
    };

    /// Cluster deletion settles once the cluster is gone.
    pub const CLUSTER_DELETED: Terminal<'static> = Terminal {
        success: &[State::Absent],
        failure: &[State::Error],
    };

    pub const JOB_FINISHED: Terminal<'static> = Terminal {
        success: &[State::Done],
        failure: &[State::Error],
    };
}

/// Repeatedly call `fetch` until the resource reaches a terminal state.
///
/// Returns the first status whose state is in `terminal.success`. A
/// status in `terminal.failure` ends the wait with
/// [`Error::RemoteOperation`] carrying the status detail. Errors from
/// `fetch` itself propagate unchanged. Between fetches the task sleeps
/// for `policy.interval`; the wait ends early with [`Error::Cancelled`]
/// or [`Error::DeadlineExceeded`].
pub async fn wait_for_terminal<F, Fut>(
    mut fetch: F,
    terminal: Terminal<'_>,
    policy: &PollPolicy,
    cancel: &CancelToken,
) -> Result<RemoteResourceStatus>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RemoteResourceStatus>>,
{
    let started = Instant::now();
    let deadline = policy.deadline.map(|d| started + d);
    let mut polls: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let status = tokio::select! {
            result = fetch() => result?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = expiry(deadline) => return Err(Error::DeadlineExceeded(started.elapsed())),
        };
        polls += 1;
        debug!(id = %status.id, state = %status.state, polls, "polled resource");

        if terminal.failure.contains(&status.state) {
            let raw = status.raw_state.as_deref().unwrap_or(status.state.as_str());
            return Err(Error::RemoteOperation {
                status: None,
                message: format!("{} entered state {}", status.id, raw),
                detail: status.detail,
            });
        }
        if terminal.success.contains(&status.state) {
            return Ok(status);
        }

        let wake = Instant::now() + policy.interval;
        match deadline {
            Some(deadline) if wake > deadline => {
                // Never sleep past the deadline.
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
                return Err(Error::DeadlineExceeded(started.elapsed()));
            }
            _ => {
                tokio::select! {
                    _ = sleep(policy.interval) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
        }
    }
}

/// Resolves at `deadline`, or never when there is none.
async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
