//! Ingress controller: watches `Ingress`/`Service`/`Secret` state, derives
//! an HAProxy configuration and rollout, and reflects exposure status back
//! onto the ingresses it manages.

pub mod driver;
pub mod drivers;
pub mod error;
pub mod k8s;
pub mod metrics;
pub mod model;
pub mod reconcile;
pub mod snapshot;
pub mod status;
pub mod streams;
pub mod telemetry;
pub mod templates;
