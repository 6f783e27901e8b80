//! The abstract Kubernetes client surface this controller's reconciliation
//! logic is written against: typed list/get/create/replace plus a watch
//! stream yielding `{ADDED|MODIFIED|DELETED, object}` events with
//! resource-version bookkeeping. Deliberately hand-written rather than
//! generated, so the reconciliation engine can run against either a real
//! cluster or an in-memory fake without caring which.

use crate::error::{Error, Result};

use futures::future::BoxFuture;
use futures::stream::BoxStream;

/// The result of a `list` call: the items plus the `resourceVersion` a
/// subsequent watch should resume from.
#[derive(Debug, Clone)]
pub struct Listed<K> {
    pub items: Vec<K>,
    pub resource_version: String,
}

/// A single watch notification, collapsed to the three kinds this
/// controller's drivers act on. Any other event kind (bookmark, error) is
/// swallowed by the client implementation before it reaches this type.
#[derive(Debug, Clone)]
pub enum WatchEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
}

impl<K> WatchEvent<K> {
    pub fn into_inner(self) -> K {
        match self {
            WatchEvent::Added(k) | WatchEvent::Modified(k) | WatchEvent::Deleted(k) => k,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, WatchEvent::Deleted(_))
    }
}

/// Namespace sentinel used for the one cluster-scoped list/watch this
/// controller performs (ingresses, across every namespace at once).
pub const ALL_NAMESPACES: &str = "";

/// Typed list/get/create/replace/watch operations over one Kubernetes
/// resource kind `K`. Implemented by [`super::kube_client::KubeResourceClient`]
/// against a real cluster and by [`super::fake::FakeResourceClient`] for
/// tests.
pub trait ResourceClient<K>: Clone + Send + Sync + 'static
where
    K: Clone + Send + Sync + 'static,
{
    fn list<'a>(&'a self, namespace: &'a str, selector: &'a str) -> BoxFuture<'a, Result<Listed<K>>>;

    fn get<'a>(&'a self, namespace: &'a str, name: &'a str) -> BoxFuture<'a, Result<Option<K>>>;

    fn create<'a>(&'a self, namespace: &'a str, obj: &'a K) -> BoxFuture<'a, Result<K>>;

    fn replace<'a>(&'a self, namespace: &'a str, name: &'a str, obj: &'a K) -> BoxFuture<'a, Result<K>>;

    /// Writes only the `status` subresource of `name`, leaving `spec` and
    /// the rest of the object untouched. A real cluster rejects status
    /// writes made against the main resource endpoint, so this exists as a
    /// distinct call rather than overloading [`Self::replace`].
    fn replace_status<'a>(&'a self, namespace: &'a str, name: &'a str, obj: &'a K) -> BoxFuture<'a, Result<K>>;

    /// Resumes from `resource_version` (the value recorded from `list`, or
    /// from a previously observed watch event). Never reorders on
    /// `resource_version`; it is used only to resume.
    fn watch(&self, namespace: &str, selector: &str, resource_version: &str) -> BoxStream<'static, Result<WatchEvent<K>>>;

    /// Watches exactly one named object, via a field selector on
    /// `metadata.name` rather than a label selector, for drivers that track
    /// a single individually-referenced backend service or TLS secret.
    fn watch_one(&self, namespace: &str, name: &str, resource_version: &str) -> BoxStream<'static, Result<WatchEvent<K>>>;
}

/// Converts a server rejection of a `NotFound` read into `Ok(None)`, the
/// convention every driver in this crate relies on for optional reads.
pub fn absent_on_not_found<K>(result: std::result::Result<K, kube::Error>, context: impl Into<String>) -> Result<Option<K>> {
    match result {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(Error::kube(context, e)),
    }
}
