//! The snapshot aggregator: keeps a live, coherent view of ingresses and
//! everything they reference, restarting the dependent substreams whenever
//! their upstream changes and yielding a new [`Snapshot`] once every
//! substream has reported at least once.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use tokio::task::AbortHandle;

use crate::drivers::{ingresses, releases, secrets, services};
use crate::error::Result;
use crate::k8s::ResourceClient;
use crate::metrics::Metrics;
use crate::model::{ResourceKey, Snapshot};
use crate::streams::{reconnect, throttle, Mingle};

enum SnapshotEvent {
    Ingresses(BTreeMap<ResourceKey, Ingress>),
    Services(BTreeMap<ResourceKey, Service>),
    Secrets(BTreeMap<ResourceKey, Secret>),
    Releases((BTreeMap<ResourceKey, Service>, BTreeMap<ResourceKey, BTreeSet<String>>)),
}

/// Drives the full aggregator. `throttle_duration` is applied to every
/// substream; `label_selector` restricts which ingresses are watched at
/// all.
pub fn watch_snapshot<CI, CS, CSec>(
    ingress_client: CI,
    service_client: CS,
    secret_client: CSec,
    label_selector: String,
    throttle_duration: Duration,
    metrics: Metrics,
) -> impl Stream<Item = Result<Snapshot>>
where
    CI: ResourceClient<Ingress>,
    CS: ResourceClient<Service>,
    CSec: ResourceClient<Secret>,
{
    async_stream::try_stream! {
        let mut mingle: Mingle<Result<SnapshotEvent>> = Mingle::new();
        {
            let client = ingress_client.clone();
            let selector = label_selector.clone();
            let source = reconnect("ingresses", metrics.clone(), move || ingresses::watch_ingresses(client.clone(), selector.clone()));
            mingle.add(throttle(source, throttle_duration).map(|map| Ok(SnapshotEvent::Ingresses(map))));
        }

        let mut ingresses_seen: Option<Vec<Ingress>> = None;
        let mut services_seen: Option<BTreeMap<ResourceKey, Service>> = None;
        let mut secrets_seen: Option<BTreeMap<ResourceKey, Secret>> = None;
        let mut release_services_seen: Option<BTreeMap<ResourceKey, Service>> = None;
        let mut release_map_seen: Option<BTreeMap<ResourceKey, BTreeSet<String>>> = None;

        let mut services_handle: Option<AbortHandle> = None;
        let mut secrets_handle: Option<AbortHandle> = None;
        let mut releases_handle: Option<AbortHandle> = None;

        while let Some(event) = mingle.next().await {
            match event? {
                SnapshotEvent::Ingresses(map) => {
                    let list: Vec<Ingress> = map.into_values().collect();

                    if let Some(handle) = services_handle.take() {
                        handle.abort();
                    }
                    let client = service_client.clone();
                    let ingresses = list.clone();
                    let source = reconnect("services", metrics.clone(), move || services::watch_ingress_services(client.clone(), &ingresses));
                    let stream = throttle(source, throttle_duration).map(|map| Ok(SnapshotEvent::Services(map)));
                    services_handle = Some(mingle.add(stream));
                    services_seen = None;

                    if let Some(handle) = secrets_handle.take() {
                        handle.abort();
                    }
                    let client = secret_client.clone();
                    let ingresses = list.clone();
                    let source = reconnect("secrets", metrics.clone(), move || secrets::watch_ingress_secrets(client.clone(), &ingresses));
                    let stream = throttle(source, throttle_duration).map(|map| Ok(SnapshotEvent::Secrets(map)));
                    secrets_handle = Some(mingle.add(stream));
                    secrets_seen = None;

                    ingresses_seen = Some(list);
                }
                SnapshotEvent::Services(map) => {
                    if let Some(handle) = releases_handle.take() {
                        handle.abort();
                    }
                    let client = service_client.clone();
                    let services_snapshot = map.clone();
                    let source =
                        reconnect("release_services", metrics.clone(), move || releases::watch_release_service_services(client.clone(), &services_snapshot));
                    let stream = throttle(source, throttle_duration).map(|pair| Ok(SnapshotEvent::Releases(pair)));
                    releases_handle = Some(mingle.add(stream));
                    release_services_seen = None;
                    release_map_seen = None;

                    services_seen = Some(map);
                }
                SnapshotEvent::Secrets(map) => {
                    secrets_seen = Some(map);
                }
                SnapshotEvent::Releases((svc_map, rel_map)) => {
                    release_services_seen = Some(svc_map);
                    release_map_seen = Some(rel_map);
                }
            }

            if let (Some(ings), Some(svcs), Some(secs), Some(rel_svcs), Some(rel_map)) =
                (&ingresses_seen, &services_seen, &secrets_seen, &release_services_seen, &release_map_seen)
            {
                let mut merged_services = svcs.clone();
                merged_services.extend(rel_svcs.clone());
                let mut snapshot = Snapshot {
                    ingresses: ings.clone(),
                    services: merged_services,
                    secrets: secs.clone(),
                    release_map: rel_map.clone(),
                };
                snapshot.sort_ingresses();
                yield snapshot;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
    use k8s_openapi::api::networking::v1::{HTTPIngressPath, HTTPIngressRuleValue, IngressBackend, IngressRule, IngressServiceBackend, IngressSpec, ServiceBackendPort};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::ResourceExt;
    use prometheus_client::registry::Registry;

    use crate::k8s::FakeResourceClient;

    fn test_metrics() -> Metrics {
        let mut registry = Registry::default();
        Metrics::register(&mut registry)
    }

    fn make_ingress(name: &str, host: &str, service: &str) -> Ingress {
        Ingress {
            metadata: ObjectMeta { namespace: Some("default".to_string()), name: Some(name.to_string()), ..Default::default() },
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some(host.to_string()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend { name: service.to_string(), port: Some(ServiceBackendPort { number: Some(80), name: None }) }),
                                resource: None,
                            },
                        }],
                    }),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn make_service(name: &str) -> Service {
        Service {
            metadata: ObjectMeta { namespace: Some("default".to_string()), name: Some(name.to_string()), ..Default::default() },
            spec: Some(ServiceSpec { ports: Some(vec![ServicePort { port: 80, ..Default::default() }]), ..Default::default() }),
            ..Default::default()
        }
    }

    /// The aggregator must not yield before every substream (ingresses,
    /// services, secrets, release services, release map) has reported at
    /// least once.
    #[tokio::test]
    async fn withholds_snapshot_until_all_substreams_report() {
        let ingresses = FakeResourceClient::<Ingress>::new();
        let services = FakeResourceClient::<Service>::new();
        let secrets = FakeResourceClient::<Secret>::new();
        ingresses.put("default", make_ingress("web", "example.com", "web-svc"));
        services.put("default", make_service("web-svc"));

        let stream = watch_snapshot(ingresses, services, secrets, String::new(), Duration::from_millis(20), test_metrics());
        futures::pin_mut!(stream);

        let snapshot = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("a snapshot arrives once every substream has reported")
            .expect("stream is not exhausted")
            .expect("no aggregation error");

        assert_eq!(snapshot.ingresses.len(), 1);
        assert!(snapshot.services.contains_key(&("default".to_string(), "web-svc".to_string())));
    }

    /// A changed ingress set closes and restarts the services, secrets, and
    /// release-service substreams, and the next coherent snapshot reflects
    /// the new ingress set.
    #[tokio::test]
    async fn ingress_set_change_restarts_dependent_substreams() {
        let ingresses = FakeResourceClient::<Ingress>::new();
        let services = FakeResourceClient::<Service>::new();
        let secrets = FakeResourceClient::<Secret>::new();
        ingresses.put("default", make_ingress("web", "example.com", "web-svc"));
        services.put("default", make_service("web-svc"));

        let stream = watch_snapshot(ingresses.clone(), services, secrets, String::new(), Duration::from_millis(20), test_metrics());
        futures::pin_mut!(stream);

        let first = tokio::time::timeout(Duration::from_secs(2), stream.next()).await.expect("first snapshot arrives").expect("ok").expect("no error");
        assert_eq!(first.ingresses.len(), 1);

        ingresses.put("default", make_ingress("api", "api.example.com", "api-svc"));

        let second = loop {
            let snapshot = tokio::time::timeout(Duration::from_secs(2), stream.next()).await.expect("a later snapshot arrives").expect("ok").expect("no error");
            if snapshot.ingresses.len() == 2 {
                break snapshot;
            }
        };
        assert!(second.ingresses.iter().any(|ing| ing.name_any() == "api"));
        assert!(second.ingresses.iter().any(|ing| ing.name_any() == "web"));
    }
}
