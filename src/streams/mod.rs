//! The stream combinators the watch pipeline is built from: `tag` labels a
//! substream before it enters a [`Mingle`], `mingle` fans many streams into
//! one, `throttle` coalesces bursts, and `zip` pairs two streams
//! element-wise. `reconnect` wraps a watch-stream factory with restart
//! policy so one flaky watch never takes down the whole pipeline.

pub mod mingle;
pub mod reconnect;
pub mod tag;
pub mod throttle;
pub mod zip;

pub use mingle::Mingle;
pub use reconnect::reconnect;
pub use tag::tag;
pub use throttle::throttle;
pub use zip::zip;
