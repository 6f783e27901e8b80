//! Waits out a rollout once a `Deployment` has been replaced or created:
//! first for the controller to post `deployment.kubernetes.io/revision`,
//! then for the matching `ReplicaSet`.

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use kube::ResourceExt;

use crate::error::{Error, Result};
use crate::k8s::ResourceClient;
use crate::model::{DEPLOYMENT_REVISION_ANNOTATION, INGRATE_NAME_LABEL};

pub async fn wait_for_revision<C>(client: &C, deployment: &Deployment) -> Result<Deployment>
where
    C: ResourceClient<Deployment>,
{
    let namespace = deployment.namespace().unwrap_or_default();
    let name = deployment.name_any();
    let resource_version = deployment.resource_version().unwrap_or_default();

    let watch = client.watch_one(&namespace, &name, &resource_version);
    futures::pin_mut!(watch);
    while let Some(event) = watch.next().await {
        let obj = event?.into_inner();
        if obj.annotations().contains_key(DEPLOYMENT_REVISION_ANNOTATION) {
            return Ok(obj);
        }
    }
    Err(Error::Fatal(format!("deployment revision never posted for {namespace}/{name}")))
}

pub async fn wait_for_replicaset<C>(client: &C, deployment: &Deployment) -> Result<ReplicaSet>
where
    C: ResourceClient<ReplicaSet>,
{
    let namespace = deployment.namespace().unwrap_or_default();
    let ingrate_name = deployment
        .labels()
        .get(INGRATE_NAME_LABEL)
        .cloned()
        .ok_or_else(|| Error::MissingData(format!("deployment {namespace}/{} missing {INGRATE_NAME_LABEL} label", deployment.name_any())))?;
    let revision = deployment.annotations().get(DEPLOYMENT_REVISION_ANNOTATION).cloned().unwrap_or_default();
    let selector = format!("{INGRATE_NAME_LABEL}={ingrate_name}");

    let listed = client.list(&namespace, &selector).await?;
    for rs in &listed.items {
        if rs.annotations().get(DEPLOYMENT_REVISION_ANNOTATION) == Some(&revision) {
            return Ok(rs.clone());
        }
    }

    let watch = client.watch(&namespace, &selector, &listed.resource_version);
    futures::pin_mut!(watch);
    while let Some(event) = watch.next().await {
        let rs = event?.into_inner();
        if rs.annotations().get(DEPLOYMENT_REVISION_ANNOTATION) == Some(&revision) {
            return Ok(rs);
        }
    }
    Err(Error::Fatal(format!("replica set for deployment revision {revision:?} never appeared")))
}
