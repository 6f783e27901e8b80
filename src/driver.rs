//! The top-level driver: mingles the snapshot stream with the
//! exposure-service watch, reconciling on every snapshot and republishing
//! ingress status whenever either side changes.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{ConfigMap, LoadBalancerStatus, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;

use crate::drivers::exposure::watch_for_deployment_exposure;
use crate::error::Result;
use crate::k8s::ResourceClient;
use crate::metrics::Metrics;
use crate::model::Snapshot;
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::snapshot::watch_snapshot;
use crate::status::publish_status;
use crate::streams::{reconnect, throttle, Mingle};

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub label_selector: String,
    pub throttle: Duration,
    pub namespace: String,
    pub name: String,
}

enum Event {
    Snapshot(Result<Snapshot>),
    Exposure(BTreeMap<String, LoadBalancerStatus>),
}

#[allow(clippy::too_many_arguments)]
pub async fn run<CIngress, CService, CSecret, CConfigMap, CDeployment, CReplicaSet>(
    ingress_client: CIngress,
    service_client: CService,
    secret_client: CSecret,
    reconciler: Reconciler<CConfigMap, CDeployment, CReplicaSet>,
    config: DriverConfig,
    metrics: Metrics,
) -> Result<()>
where
    CIngress: ResourceClient<Ingress>,
    CService: ResourceClient<Service>,
    CSecret: ResourceClient<Secret>,
    CConfigMap: ResourceClient<ConfigMap>,
    CDeployment: ResourceClient<Deployment>,
    CReplicaSet: ResourceClient<ReplicaSet>,
{
    let mut mingle: Mingle<Event> = Mingle::new();
    mingle.add(
        watch_snapshot(
            ingress_client.clone(),
            service_client.clone(),
            secret_client,
            config.label_selector.clone(),
            config.throttle,
            metrics.clone(),
        )
        .map(Event::Snapshot),
    );
    {
        let namespace = config.namespace.clone();
        let name = config.name.clone();
        let source = reconnect("exposure", metrics.clone(), move || {
            watch_for_deployment_exposure(service_client.clone(), namespace.clone(), name.clone())
        });
        mingle.add(throttle(source, config.throttle).map(Event::Exposure));
    }

    let mut ingresses_seen: Option<Vec<Ingress>> = None;
    let mut load_balancers_seen: Option<BTreeMap<String, LoadBalancerStatus>> = None;

    while let Some(event) = mingle.next().await {
        match event {
            Event::Snapshot(snapshot) => {
                let snapshot = snapshot?;
                metrics.mark_ready();
                match reconciler.reconcile(&snapshot).await {
                    Ok(ReconcileOutcome::Unchanged) => tracing::debug!("reconcile cycle left the deployment unchanged"),
                    Ok(ReconcileOutcome::RolledOut) => tracing::info!("reconcile cycle rolled out a new deployment revision"),
                    Err(error) if error.is_conflict() => {
                        tracing::debug!(%error, "reconcile cycle hit a write conflict, skipping until the next snapshot")
                    }
                    Err(error) if error.is_invalid() => tracing::error!(%error, "server rejected a rendered object, skipping cycle"),
                    Err(error) => tracing::error!(%error, "reconcile cycle failed, will retry on the next snapshot"),
                }
                ingresses_seen = Some(snapshot.ingresses);
            }
            Event::Exposure(load_balancers) => {
                load_balancers_seen = Some(load_balancers);
            }
        }

        if let (Some(ingresses), Some(load_balancers)) = (&ingresses_seen, &load_balancers_seen) {
            if let Err(error) = publish_status(&ingress_client, ingresses, load_balancers).await {
                tracing::error!(%error, "failed to publish ingress status");
            }
        }
    }

    Ok(())
}
