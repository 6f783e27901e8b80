//! Resolves release-selector stub services into the concrete services they
//! currently select, one independently-tracked watch per stub.
//!
//! Each stub tracks its own `resourceVersion`: a selector change on one
//! stub never disturbs another's watch position.

use std::collections::{BTreeMap, BTreeSet};

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;

use crate::error::Result;
use crate::k8s::{ResourceClient, WatchEvent};
use crate::model::{key_of, ResourceKey, INGRATE_RELEASE_SELECTOR_ANNOTATION};
use crate::streams::{tag, Mingle};

/// `(stub key, stub namespace, release selector)` for every service in
/// `services` carrying the release-selector annotation.
pub fn release_stubs(services: &BTreeMap<ResourceKey, Service>) -> Vec<(ResourceKey, String, String)> {
    services
        .iter()
        .filter_map(|((ns, name), svc)| {
            let selector = svc.annotations().get(INGRATE_RELEASE_SELECTOR_ANNOTATION)?;
            Some((key_of(ns, name), ns.clone(), selector.clone()))
        })
        .collect()
}

type ReleaseMap = BTreeMap<ResourceKey, BTreeSet<String>>;
type ServiceMap = BTreeMap<ResourceKey, Service>;

pub fn watch_release_service_services<C>(
    client: C,
    services: &BTreeMap<ResourceKey, Service>,
) -> impl Stream<Item = Result<(ServiceMap, ReleaseMap)>> + use<C>
where
    C: ResourceClient<Service>,
{
    let stubs = release_stubs(services);
    async_stream::try_stream! {
        let mut resolved: ServiceMap = BTreeMap::new();
        let mut release_map: ReleaseMap = BTreeMap::new();
        let mut versions: BTreeMap<ResourceKey, String> = BTreeMap::new();

        for (stub_key, namespace, selector) in &stubs {
            let listed = client.list(namespace, selector).await?;
            let mut names = BTreeSet::new();
            for svc in listed.items {
                let key = key_of(&svc.namespace().unwrap_or_default(), &svc.name_any());
                names.insert(svc.name_any());
                resolved.insert(key, svc);
            }
            release_map.insert(stub_key.clone(), names);
            versions.insert(stub_key.clone(), listed.resource_version);
        }
        yield (resolved.clone(), release_map.clone());

        if stubs.is_empty() {
            futures::future::pending::<()>().await;
        }

        let mingle: Mingle<(ResourceKey, Result<WatchEvent<Service>>)> = Mingle::new();
        for (stub_key, namespace, selector) in &stubs {
            let resource_version = versions.get(stub_key).cloned().unwrap_or_default();
            let watch = client.watch(namespace, selector, &resource_version);
            mingle.add(tag(stub_key.clone(), watch));
        }

        let mut mingle = mingle;
        while let Some((stub_key, event)) = mingle.next().await {
            match event? {
                WatchEvent::Added(svc) | WatchEvent::Modified(svc) => {
                    let key = key_of(&svc.namespace().unwrap_or_default(), &svc.name_any());
                    release_map.entry(stub_key).or_default().insert(svc.name_any());
                    resolved.insert(key, svc);
                }
                WatchEvent::Deleted(svc) => {
                    let key = key_of(&svc.namespace().unwrap_or_default(), &svc.name_any());
                    resolved.remove(&key);
                    if let Some(names) = release_map.get_mut(&stub_key) {
                        names.remove(&svc.name_any());
                    }
                }
            }
            yield (resolved.clone(), release_map.clone());
        }
    }
}
