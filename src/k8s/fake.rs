//! In-memory [`ResourceClient`] used by tests: a `BTreeMap` of objects plus
//! a broadcast channel for watch events, addressed by `(namespace, name)`
//! rather than going over HTTP.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use kube::Resource;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::k8s::client::{Listed, ResourceClient, WatchEvent, ALL_NAMESPACES};

type Key = (String, String);

struct Inner<K> {
    items: BTreeMap<Key, K>,
    resource_version: u64,
    events: broadcast::Sender<(Key, WatchEvent<K>)>,
}

/// A fake cluster for one resource kind. Cheaply `Clone`-able (all state
/// lives behind the `Arc`), matching the real `kube::Client` handle shape.
pub struct FakeResourceClient<K> {
    inner: Arc<Mutex<Inner<K>>>,
    /// Call counters tests assert against directly, so a test can check e.g.
    /// that a second reconciliation with identical rendered data reuses the
    /// existing object rather than issuing another create, without the fake
    /// needing to expose a full request log.
    creates: Arc<AtomicUsize>,
    replaces: Arc<AtomicUsize>,
    status_replaces: Arc<AtomicUsize>,
}

impl<K> Clone for FakeResourceClient<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            creates: self.creates.clone(),
            replaces: self.replaces.clone(),
            status_replaces: self.status_replaces.clone(),
        }
    }
}

impl<K: Clone + Send + Sync + 'static> Default for FakeResourceClient<K> {
    fn default() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Mutex::new(Inner { items: BTreeMap::new(), resource_version: 0, events })),
            creates: Arc::new(AtomicUsize::new(0)),
            replaces: Arc::new(AtomicUsize::new(0)),
            status_replaces: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<K> FakeResourceClient<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.resource_version += 1;
        inner.resource_version
    }

    /// Seeds or overwrites an object and broadcasts an `Added`/`Modified`
    /// event to any live watchers, for tests driving the fake cluster's
    /// state forward directly rather than through a `ResourceClient` call.
    pub fn put(&self, namespace: &str, obj: K) {
        let name = obj.meta().name.clone().expect("object must have a name");
        let key = (namespace.to_string(), name);
        let mut inner = self.inner.lock().unwrap();
        let existed = inner.items.contains_key(&key);
        inner.items.insert(key.clone(), obj.clone());
        let event = if existed { WatchEvent::Modified(obj) } else { WatchEvent::Added(obj) };
        let _ = inner.events.send((key, event));
    }

    pub fn create_call_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn replace_call_count(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    pub fn replace_status_call_count(&self) -> usize {
        self.status_replaces.load(Ordering::SeqCst)
    }

    /// Removes an object and broadcasts a `Deleted` event.
    pub fn remove(&self, namespace: &str, name: &str) {
        let key = (namespace.to_string(), name.to_string());
        let mut inner = self.inner.lock().unwrap();
        if let Some(obj) = inner.items.remove(&key) {
            let _ = inner.events.send((key, WatchEvent::Deleted(obj)));
        }
    }

    fn labels_match(obj: &K, selector: &str) -> bool {
        if selector.is_empty() {
            return true;
        }
        let labels = obj.meta().labels.clone().unwrap_or_default();
        selector.split(',').map(str::trim).filter(|s| !s.is_empty()).all(|clause| match clause.split_once('=') {
            Some((k, v)) => labels.get(k.trim()).map(|have| have == v.trim()).unwrap_or(false),
            None => false,
        })
    }
}

impl<K> ResourceClient<K> for FakeResourceClient<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    fn list<'a>(&'a self, namespace: &'a str, selector: &'a str) -> BoxFuture<'a, Result<Listed<K>>> {
        Box::pin(async move {
            let inner = self.inner.lock().unwrap();
            let items = inner
                .items
                .iter()
                .filter(|((ns, _), obj)| (namespace == ALL_NAMESPACES || ns == namespace) && Self::labels_match(obj, selector))
                .map(|(_, obj)| obj.clone())
                .collect();
            Ok(Listed { items, resource_version: inner.resource_version.to_string() })
        })
    }

    fn get<'a>(&'a self, namespace: &'a str, name: &'a str) -> BoxFuture<'a, Result<Option<K>>> {
        Box::pin(async move {
            let inner = self.inner.lock().unwrap();
            Ok(inner.items.get(&(namespace.to_string(), name.to_string())).cloned())
        })
    }

    fn create<'a>(&'a self, namespace: &'a str, obj: &'a K) -> BoxFuture<'a, Result<K>> {
        Box::pin(async move {
            let mut obj = obj.clone();
            if obj.meta().name.is_none() {
                let prefix = obj.meta().generate_name.clone().unwrap_or_default();
                let suffix = self.next_version();
                obj.meta_mut().name = Some(format!("{prefix}{suffix:05x}"));
            }
            let name = obj.meta().name.clone().ok_or_else(|| Error::MissingData("object has no name".into()))?;
            self.put(namespace, obj.clone());
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.get(namespace, &name).await.map(|o| o.expect("just inserted"))
        })
    }

    fn replace<'a>(&'a self, namespace: &'a str, name: &'a str, obj: &'a K) -> BoxFuture<'a, Result<K>> {
        Box::pin(async move {
            self.put(namespace, obj.clone());
            self.replaces.fetch_add(1, Ordering::SeqCst);
            self.get(namespace, name).await.map(|o| o.expect("just replaced"))
        })
    }

    /// Same upsert `replace` performs: the fake has no separate `status`
    /// storage to merge into, so this exists to give tests a distinct call
    /// counter and keep call sites honest about which subresource they mean
    /// to write.
    fn replace_status<'a>(&'a self, namespace: &'a str, name: &'a str, obj: &'a K) -> BoxFuture<'a, Result<K>> {
        Box::pin(async move {
            self.put(namespace, obj.clone());
            self.status_replaces.fetch_add(1, Ordering::SeqCst);
            self.get(namespace, name).await.map(|o| o.expect("just replaced"))
        })
    }

    fn watch(&self, namespace: &str, selector: &str, _resource_version: &str) -> BoxStream<'static, Result<WatchEvent<K>>> {
        let receiver = self.inner.lock().unwrap().events.subscribe();
        let namespace = namespace.to_string();
        let selector = selector.to_string();
        tokio_stream::wrappers::BroadcastStream::new(receiver)
            .filter_map(move |res| {
                let namespace = namespace.clone();
                let selector = selector.clone();
                async move {
                    match res {
                        Ok(((ns, _), event)) => {
                            if namespace != ALL_NAMESPACES && ns != namespace {
                                return None;
                            }
                            let obj = match &event {
                                WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => o,
                            };
                            if !Self::labels_match(obj, &selector) {
                                return None;
                            }
                            Some(Ok(event))
                        }
                        Err(_lagged) => Some(Err(Error::StreamClosed("fake watch receiver lagged".into()))),
                    }
                }
            })
            .boxed()
    }

    fn watch_one(&self, namespace: &str, name: &str, _resource_version: &str) -> BoxStream<'static, Result<WatchEvent<K>>> {
        let receiver = self.inner.lock().unwrap().events.subscribe();
        let namespace = namespace.to_string();
        let name = name.to_string();
        tokio_stream::wrappers::BroadcastStream::new(receiver)
            .filter_map(move |res| {
                let namespace = namespace.clone();
                let name = name.clone();
                async move {
                    match res {
                        Ok(((ns, n), event)) => (ns == namespace && n == name).then_some(Ok(event)),
                        Err(_lagged) => Some(Err(Error::StreamClosed("fake watch receiver lagged".into()))),
                    }
                }
            })
            .boxed()
    }
}
