//! Loads and monitors the backend services referenced by a set of
//! ingresses. Each referenced `(namespace, name)` is read once, then
//! watched independently; events from any of them re-emit the full map.

use std::collections::{BTreeMap, BTreeSet};

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;

use crate::error::Result;
use crate::k8s::{ResourceClient, WatchEvent};
use crate::model::{key_of, ResourceKey};
use crate::streams::{tag, Mingle};

/// Every `(namespace, serviceName)` an ingress's rules or default backend
/// point at.
pub fn backend_refs(ingresses: &[Ingress]) -> BTreeSet<ResourceKey> {
    let mut refs = BTreeSet::new();
    for ing in ingresses {
        let namespace = ing.namespace().unwrap_or_default();
        if let Some(spec) = &ing.spec {
            for rule in spec.rules.iter().flatten() {
                if let Some(http) = &rule.http {
                    for path in &http.paths {
                        if let Some(name) = path.backend.service.as_ref().map(|s| s.name.clone()) {
                            refs.insert(key_of(&namespace, &name));
                        }
                    }
                }
            }
            if let Some(name) = spec.default_backend.as_ref().and_then(|b| b.service.as_ref()).map(|s| s.name.clone()) {
                refs.insert(key_of(&namespace, &name));
            }
        }
    }
    refs
}

pub fn watch_ingress_services<C>(client: C, ingresses: &[Ingress]) -> impl Stream<Item = Result<BTreeMap<ResourceKey, Service>>> + use<C>
where
    C: ResourceClient<Service>,
{
    let refs = backend_refs(ingresses);
    async_stream::try_stream! {
        let reads = futures::future::join_all(refs.iter().map(|(ns, name)| {
            let client = client.clone();
            async move { (key_of(ns, name), client.get(ns, name).await) }
        }))
        .await;
        let mut services: BTreeMap<ResourceKey, Service> = BTreeMap::new();
        for (key, read) in reads {
            if let Some(svc) = read? {
                services.insert(key, svc);
            }
        }
        yield services.clone();

        if refs.is_empty() {
            futures::future::pending::<()>().await;
        }

        let mingle: Mingle<(ResourceKey, Result<WatchEvent<Service>>)> = Mingle::new();
        for (ns, name) in &refs {
            let key = key_of(ns, name);
            let resource_version = services.get(&key).and_then(|s| s.resource_version()).unwrap_or_default();
            let watch = client.watch_one(ns, name, &resource_version);
            mingle.add(tag(key, watch));
        }

        let mut mingle = mingle;
        while let Some((key, event)) = mingle.next().await {
            match event? {
                WatchEvent::Added(svc) | WatchEvent::Modified(svc) => {
                    services.insert(key, svc);
                }
                WatchEvent::Deleted(_) => {
                    services.remove(&key);
                }
            }
            yield services.clone();
        }
    }
}
