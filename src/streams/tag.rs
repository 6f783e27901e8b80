//! Tags every item of a stream with a constant, used to label a substream
//! before feeding it into a [`super::mingle::Mingle`].

use futures::{Stream, StreamExt};

pub fn tag<Tag, S>(tag: Tag, stream: S) -> impl Stream<Item = (Tag, S::Item)>
where
    Tag: Clone,
    S: Stream,
{
    stream.map(move |item| (tag.clone(), item))
}
