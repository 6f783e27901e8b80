//! Watches the controller's own exposure services for a load-balancer
//! address to appear, feeding the status publisher.

use std::collections::BTreeMap;

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::{LoadBalancerStatus, Service};
use kube::ResourceExt;

use crate::error::Result;
use crate::k8s::{ResourceClient, WatchEvent};
use crate::model::INGRATE_NAME_LABEL;

fn is_exposed_load_balancer(svc: &Service) -> Option<LoadBalancerStatus> {
    let is_load_balancer = svc.spec.as_ref().and_then(|s| s.type_.as_deref()) == Some("LoadBalancer");
    if !is_load_balancer {
        return None;
    }
    svc.status.as_ref().and_then(|s| s.load_balancer.clone())
}

pub fn watch_for_deployment_exposure<C>(client: C, namespace: String, name: String) -> impl Stream<Item = Result<BTreeMap<String, LoadBalancerStatus>>>
where
    C: ResourceClient<Service>,
{
    let selector = format!("{INGRATE_NAME_LABEL}={name}");
    async_stream::try_stream! {
        let listed = client.list(&namespace, &selector).await?;
        let mut load_balancers: BTreeMap<String, LoadBalancerStatus> = listed
            .items
            .iter()
            .filter_map(|svc| is_exposed_load_balancer(svc).map(|lb| (svc.name_any(), lb)))
            .collect();
        yield load_balancers.clone();

        let watch = client.watch(&namespace, &selector, &listed.resource_version);
        futures::pin_mut!(watch);
        while let Some(event) = watch.next().await {
            match event? {
                WatchEvent::Added(svc) | WatchEvent::Modified(svc) => match is_exposed_load_balancer(&svc) {
                    Some(lb) => {
                        load_balancers.insert(svc.name_any(), lb);
                    }
                    None => {
                        load_balancers.remove(&svc.name_any());
                    }
                },
                WatchEvent::Deleted(svc) => {
                    load_balancers.remove(&svc.name_any());
                }
            }
            yield load_balancers.clone();
        }
    }
}
