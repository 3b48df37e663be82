use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Drive `fut` to completion unless `cancel` fires first.
///
/// Returns `None` on cancellation. The future is dropped at that point, which
/// aborts in-flight requests and kills `kill_on_drop` children.
pub async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}
