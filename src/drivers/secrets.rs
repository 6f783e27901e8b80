//! Loads and monitors the TLS secrets referenced by a set of ingresses.

use std::collections::{BTreeMap, BTreeSet};

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;

use crate::error::Result;
use crate::k8s::{ResourceClient, WatchEvent};
use crate::model::{key_of, ResourceKey};
use crate::streams::{tag, Mingle};

pub fn secret_refs(ingresses: &[Ingress]) -> BTreeSet<ResourceKey> {
    let mut refs = BTreeSet::new();
    for ing in ingresses {
        let namespace = ing.namespace().unwrap_or_default();
        if let Some(spec) = &ing.spec {
            for tls in spec.tls.iter().flatten() {
                if let Some(name) = &tls.secret_name {
                    refs.insert(key_of(&namespace, name));
                }
            }
        }
    }
    refs
}

pub fn watch_ingress_secrets<C>(client: C, ingresses: &[Ingress]) -> impl Stream<Item = Result<BTreeMap<ResourceKey, Secret>>> + use<C>
where
    C: ResourceClient<Secret>,
{
    let refs = secret_refs(ingresses);
    async_stream::try_stream! {
        let reads = futures::future::join_all(refs.iter().map(|(ns, name)| {
            let client = client.clone();
            async move { (key_of(ns, name), client.get(ns, name).await) }
        }))
        .await;
        let mut secrets: BTreeMap<ResourceKey, Secret> = BTreeMap::new();
        for (key, read) in reads {
            if let Some(secret) = read? {
                secrets.insert(key, secret);
            }
        }
        yield secrets.clone();

        if refs.is_empty() {
            futures::future::pending::<()>().await;
        }

        let mingle: Mingle<(ResourceKey, Result<WatchEvent<Secret>>)> = Mingle::new();
        for (ns, name) in &refs {
            let key = key_of(ns, name);
            let resource_version = secrets.get(&key).and_then(|s| s.resource_version()).unwrap_or_default();
            let watch = client.watch_one(ns, name, &resource_version);
            mingle.add(tag(key, watch));
        }

        let mut mingle = mingle;
        while let Some((key, event)) = mingle.next().await {
            match event? {
                WatchEvent::Added(secret) | WatchEvent::Modified(secret) => {
                    secrets.insert(key, secret);
                }
                WatchEvent::Deleted(_) => {
                    secrets.remove(&key);
                }
            }
            yield secrets.clone();
        }
    }
}
