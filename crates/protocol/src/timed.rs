//! Deadlines for collaborator calls.
//!
//! Plugin and transmitter calls get a deadline but are never aborted: a call
//! still running at `deadline + grace` gets a warning and is then awaited to
//! completion.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Await `fut`, warning once if it is still pending after `deadline + grace`.
pub async fn timed_call<F>(
    name: &'static str,
    deadline: Duration,
    grace: Duration,
    fut: F,
) -> F::Output
where
    F: Future,
{
    let started = Instant::now();
    tokio::pin!(fut);

    tokio::select! {
        biased;
        out = &mut fut => return out,
        _ = tokio::time::sleep(deadline + grace) => {
            warn!(
                call = name,
                deadline_ms = deadline.as_millis() as u64,
                "Call is taking too long"
            );
        }
    }

    let out = fut.await;
    warn!(
        call = name,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Call finished after its deadline"
    );
    out
}

/// Sleep until `deadline`, or forever if there is none.
///
/// Lets an optional timer sit in a `select!` arm.
pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
