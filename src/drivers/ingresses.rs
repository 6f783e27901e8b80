//! Lists ingresses cluster-wide, then watches from the listed
//! `resourceVersion`, re-emitting the full map on every change.

use std::collections::BTreeMap;

use futures::{Stream, StreamExt};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;

use crate::error::Result;
use crate::k8s::{ResourceClient, WatchEvent, ALL_NAMESPACES};
use crate::model::{key_of, ResourceKey};

pub fn watch_ingresses<C>(client: C, label_selector: String) -> impl Stream<Item = Result<BTreeMap<ResourceKey, Ingress>>>
where
    C: ResourceClient<Ingress>,
{
    async_stream::try_stream! {
        let listed = client.list(ALL_NAMESPACES, &label_selector).await?;
        let mut ingresses: BTreeMap<ResourceKey, Ingress> = listed
            .items
            .into_iter()
            .map(|ing| (key_of(&ing.namespace().unwrap_or_default(), &ing.name_any()), ing))
            .collect();
        yield ingresses.clone();

        let watch = client.watch(ALL_NAMESPACES, &label_selector, &listed.resource_version);
        futures::pin_mut!(watch);
        while let Some(event) = watch.next().await {
            match event? {
                WatchEvent::Added(ing) | WatchEvent::Modified(ing) => {
                    let key = key_of(&ing.namespace().unwrap_or_default(), &ing.name_any());
                    ingresses.insert(key, ing);
                }
                WatchEvent::Deleted(ing) => {
                    let key = key_of(&ing.namespace().unwrap_or_default(), &ing.name_any());
                    ingresses.remove(&key);
                }
            }
            yield ingresses.clone();
        }
    }
}
