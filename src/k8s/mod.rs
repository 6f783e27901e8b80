//! The hand-rolled Kubernetes client seam: typed list/get/create/replace
//! plus a collapsed-tag watch stream, backed by a real cluster
//! ([`kube_client`]) or an in-memory fake ([`fake`]) for tests.

pub mod client;
pub mod fake;
pub mod kube_client;

pub use client::{absent_on_not_found, Listed, ResourceClient, WatchEvent, ALL_NAMESPACES};
pub use fake::FakeResourceClient;
pub use kube_client::{KubeResource, KubeResourceClient};
