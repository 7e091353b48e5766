//! Cancellation helpers shared by the authorization client and job waits
//!
//! Every blocking call in the guard races its result against two
//! cancellation tokens (the caller's and the request's own) plus an
//! optional deadline. A result that is ready at the same time as a
//! cancellation wins.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::error::{GuardError, GuardResult};

/// Await `fut` unless `outer` or `inner` is cancelled or `timeout` elapses first
///
/// Returns `GuardError::Cancelled` on cancellation and `GuardError::Timeout`
/// when the deadline passes.
pub async fn race_cancellation<F>(
    outer: &CancellationToken,
    inner: &CancellationToken,
    timeout: Option<Duration>,
    fut: F,
) -> GuardResult<F::Output>
where
    F: Future,
{
    let deadline = async {
        match timeout {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        output = fut => Ok(output),
        _ = outer.cancelled() => Err(GuardError::Cancelled),
        _ = inner.cancelled() => Err(GuardError::Cancelled),
        _ = deadline => Err(GuardError::Timeout(timeout.unwrap_or_default())),
    }
}
