//! The status publisher: merges every exposure service's
//! `LoadBalancerStatus` (sorted by service name) and reflects the result
//! onto every managed ingress's `status.loadBalancer`, skipping ingresses
//! that already carry it.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus};
use k8s_openapi::api::networking::v1::{Ingress, IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::error::Result;
use crate::k8s::ResourceClient;

/// `Service.status.loadBalancer` and `Ingress.status.loadBalancer` are
/// distinct generated types with the same shape; `ports` is dropped here
/// since this controller does not reason about per-port load-balancer
/// status.
fn as_ingress_point(p: LoadBalancerIngress) -> IngressLoadBalancerIngress {
    IngressLoadBalancerIngress { hostname: p.hostname, ip: p.ip, ports: None }
}

pub async fn publish_status<C>(client: &C, ingresses: &[Ingress], load_balancers: &BTreeMap<String, LoadBalancerStatus>) -> Result<()>
where
    C: ResourceClient<Ingress>,
{
    if load_balancers.is_empty() {
        tracing::debug!("no exposures found, leaving ingress status untouched");
        return Ok(());
    }

    let mut merged_ingress_points = Vec::new();
    for lb in load_balancers.values() {
        merged_ingress_points.extend(lb.ingress.clone().unwrap_or_default().into_iter().map(as_ingress_point));
    }
    let merged = IngressLoadBalancerStatus { ingress: Some(merged_ingress_points) };

    for ing in ingresses {
        let current = ing.status.as_ref().and_then(|s| s.load_balancer.clone());
        if current.as_ref() == Some(&merged) {
            continue;
        }

        let namespace = ing.namespace().unwrap_or_default();
        let name = ing.name_any();
        tracing::info!(%namespace, %name, ?merged, "updating ingress status");

        let patch = Ingress {
            metadata: ObjectMeta { namespace: Some(namespace.clone()), name: Some(name.clone()), ..Default::default() },
            status: Some(IngressStatus { load_balancer: Some(merged.clone()), ..Default::default() }),
            ..Default::default()
        };
        client.replace_status(&namespace, &name, &patch).await?;
    }

    Ok(())
}
