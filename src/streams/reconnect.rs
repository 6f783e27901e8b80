//! Restart-with-backoff wrapper around a watch-stream factory: a watch
//! stream ending or erroring is expected and restartable, never fatal to
//! the surrounding pipeline. Backs off exponentially between restarts,
//! resetting once a restart produces at least one item.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use futures::{Stream, StreamExt};

use crate::error::Result;
use crate::metrics::Metrics;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

fn fresh_backoff() -> impl Iterator<Item = Duration> {
    ExponentialBuilder::default().with_max_delay(MAX_BACKOFF).without_max_times().build()
}

/// Re-invokes `make` every time its stream ends or yields an error,
/// sleeping an exponentially growing delay between attempts (reset once a
/// restart produces at least one item). The returned stream never
/// finishes and never yields `Err`: errors are logged, counted against
/// `watch_stream_restarts_total`, and swallowed, so a caller folding this
/// into a [`super::Mingle`] never has to treat one flaky watch as fatal to
/// the whole pipeline.
pub fn reconnect<T, S, F>(kind: &'static str, metrics: Metrics, mut make: F) -> impl Stream<Item = T>
where
    T: Send + 'static,
    S: Stream<Item = Result<T>> + Send + 'static,
    F: FnMut() -> S + Send + 'static,
{
    async_stream::stream! {
        let mut backoff = fresh_backoff();
        loop {
            let stream = make();
            futures::pin_mut!(stream);
            let mut produced = false;
            while let Some(item) = stream.next().await {
                match item {
                    Ok(value) => {
                        produced = true;
                        yield value;
                    }
                    Err(error) => {
                        tracing::warn!(%error, kind, "watch stream error, reconnecting");
                        break;
                    }
                }
            }

            if produced {
                backoff = fresh_backoff();
            }
            metrics.mark_watch_restart(kind);
            let delay = backoff.next().unwrap_or(MAX_BACKOFF);
            tracing::debug!(kind, delay_ms = delay.as_millis() as u64, "restarting watch stream");
            tokio::time::sleep(delay).await;
        }
    }
}
