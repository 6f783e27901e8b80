//! Shared constants, key types, and the aggregated snapshot the watch
//! pipeline hands to the reconciler.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;

pub const DEPLOYMENT_REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";
pub const INGRATE_CONFIGMAP_VERSION_ANNOTATION: &str = "ingrate.maternity.io/configmap-version";
pub const INGRATE_NAME_LABEL: &str = "ingrate.maternity.io/name";
pub const INGRATE_RELEASE_COOKIE_ANNOTATION: &str = "ingrate.maternity.io/release-cookie";
pub const INGRATE_RELEASE_DEFAULT_ANNOTATION: &str = "ingrate.maternity.io/release-default";
pub const INGRATE_RELEASE_SELECTOR_ANNOTATION: &str = "ingrate.maternity.io/release-selector";

/// `(namespace, name)`, the identity every watch driver keys its local map
/// by.
pub type ResourceKey = (String, String);

pub fn key_of(namespace: &str, name: &str) -> ResourceKey {
    (namespace.to_string(), name.to_string())
}

/// The coherent view the snapshot aggregator yields whenever every
/// substream has reported at least once: ingresses sorted for stable
/// template output, the union of directly-referenced and release-selector-resolved
/// services, referenced TLS secrets, and the release map each release-stub
/// service resolved to.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub ingresses: Vec<Ingress>,
    pub services: BTreeMap<ResourceKey, Service>,
    pub secrets: BTreeMap<ResourceKey, Secret>,
    /// Keyed by the release-stub service's own `(namespace, name)`; the
    /// value is the set of concrete service names its `release-selector`
    /// annotation currently resolves to.
    pub release_map: BTreeMap<ResourceKey, BTreeSet<String>>,
}

impl Snapshot {
    pub fn sort_ingresses(&mut self) {
        self.ingresses.sort_by(|a, b| {
            let a_ns = a.metadata.namespace.as_deref().unwrap_or_default();
            let b_ns = b.metadata.namespace.as_deref().unwrap_or_default();
            (a_ns, a.metadata.name.as_deref().unwrap_or_default())
                .cmp(&(b_ns, b.metadata.name.as_deref().unwrap_or_default()))
        });
    }
}
