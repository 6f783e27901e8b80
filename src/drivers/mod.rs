//! The watch drivers: one per resource kind this controller needs a live
//! view of, each a list-then-watch loop re-emitting its full map (or, for
//! the rollout waiters, resolving once a condition is met).

pub mod deployment;
pub mod exposure;
pub mod ingresses;
pub mod releases;
pub mod secrets;
pub mod services;
