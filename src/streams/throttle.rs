//! Trailing-edge debounce/coalesce: rapid bursts of updates collapse to the
//! single most recent value once the source goes quiet for `duration`.

use std::time::Duration;

use futures::{Stream, StreamExt};

pub fn throttle<S>(stream: S, duration: Duration) -> impl Stream<Item = S::Item>
where
    S: Stream + Send + 'static,
    S::Item: Send + 'static,
{
    async_stream::stream! {
        futures::pin_mut!(stream);
        while let Some(first) = stream.next().await {
            let mut latest = first;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => break,
                    next = stream.next() => match next {
                        Some(item) => latest = item,
                        None => {
                            yield latest;
                            return;
                        }
                    },
                }
            }
            yield latest;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn coalesces_a_burst_into_the_latest_value() {
        let burst = async_stream::stream! {
            yield 1;
            tokio::time::sleep(Duration::from_millis(1)).await;
            yield 2;
            tokio::time::sleep(Duration::from_millis(1)).await;
            yield 3;
        };
        let throttled = throttle(burst, Duration::from_millis(50));
        futures::pin_mut!(throttled);
        let first = throttled.next().await;
        assert_eq!(first, Some(3));
        assert_eq!(throttled.next().await, None);
    }
}
