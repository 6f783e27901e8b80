//! Element-wise pairing of two streams: yields `(a_item, b_item)` until
//! either source exhausts. Thin enough that `futures::StreamExt::zip`
//! already does the work; this wrapper just gives call sites a name that
//! reads consistently with the rest of the stream-combinator module.

use futures::{Stream, StreamExt};

pub fn zip<A, B>(a: A, b: B) -> impl Stream<Item = (A::Item, B::Item)>
where
    A: Stream,
    B: Stream,
{
    a.zip(b)
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn pairs_elements_until_the_shorter_source_exhausts() {
        let a = stream::iter(vec![1, 2, 3]);
        let b = stream::iter(vec!["a", "b"]);
        let pairs: Vec<_> = zip(a, b).collect().await;
        assert_eq!(pairs, vec![(1, "a"), (2, "b")]);
    }
}
