//! Dynamic, closable fair merger: an unbounded set of streams, any of which
//! may be added after the merger is already being polled, and any of which
//! may be torn down independently by aborting the task that pumps it.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// A fan-in point fed by independently spawned pump tasks. Each call to
/// [`Mingle::add`] starts pumping a new stream into the shared channel and
/// returns a handle that aborts just that pump without disturbing the
/// others.
pub struct Mingle<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T: Send + 'static> Default for Mingle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Mingle<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Spawns a task pumping `stream` into this merger. The returned handle
    /// aborts the pump; items already sent before the abort are still
    /// delivered to the receiver.
    pub fn add<S>(&self, stream: S) -> AbortHandle
    where
        S: Stream<Item = T> + Send + 'static,
        T: 'static,
    {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            futures::pin_mut!(stream);
            while let Some(item) = futures::StreamExt::next(&mut stream).await {
                if tx.send(item).is_err() {
                    break;
                }
            }
        });
        handle.abort_handle()
    }
}

impl<T> Stream for Mingle<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn merges_two_streams_and_aborts_one() {
        let mingle: Mingle<i32> = Mingle::new();
        mingle.add(futures::stream::iter(vec![1, 2, 3]));
        let handle = mingle.add(futures::stream::pending::<i32>());

        let mut mingle = mingle;
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(mingle.next().await.unwrap());
        }
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3]);

        handle.abort();
    }
}
