//! The reconciler: given one coherent [`Snapshot`], derives the HAProxy
//! config, rotates the versioned `ConfigMap` if its content changed, rolls
//! the HAProxy `Deployment` forward, and pins the `ConfigMap`'s owner
//! reference to the `ReplicaSet` the rollout produced.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::networking::v1::{Ingress, IngressServiceBackend, ServiceBackendPort};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;

use crate::drivers::deployment::{wait_for_replicaset, wait_for_revision};
use crate::error::{Error, Result};
use crate::k8s::ResourceClient;
use crate::metrics::Metrics;
use crate::model::{Snapshot, DEPLOYMENT_REVISION_ANNOTATION, INGRATE_CONFIGMAP_VERSION_ANNOTATION, INGRATE_NAME_LABEL};
use crate::templates::{ConfigContext, DeploymentContext, IngressView, PathView, Renderer, RuleView, ServerView};

/// The annotation the previous rendered `deployment.yaml` is stashed under.
/// Deliberately not under the `ingrate.maternity.io/` prefix used
/// elsewhere: this one predates that convention and stable key names on
/// an existing annotation matter more than uniform naming.
pub const DEPLOYMENT_YAML_ANNOTATION: &str = "ingress-deployment-yaml";

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub namespace: String,
    pub ingrate_name: String,
    pub image: String,
    pub replicas: i32,
}

/// What a reconcile cycle did, so the driver can log it; cycle count,
/// duration, and failure are recorded independently by
/// [`crate::metrics::ReconcileMeasurer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The deployment revision did not change; no rollout wait happened.
    Unchanged,
    /// A new revision was rolled out and its `ReplicaSet` was found.
    RolledOut,
}

pub struct Reconciler<CConfigMap, CDeployment, CReplicaSet> {
    configmaps: CConfigMap,
    deployments: CDeployment,
    replicasets: CReplicaSet,
    renderer: Renderer,
    config: ReconcileConfig,
    metrics: Metrics,
}

impl<CConfigMap, CDeployment, CReplicaSet> Reconciler<CConfigMap, CDeployment, CReplicaSet>
where
    CConfigMap: ResourceClient<ConfigMap>,
    CDeployment: ResourceClient<Deployment>,
    CReplicaSet: ResourceClient<ReplicaSet>,
{
    pub fn new(
        configmaps: CConfigMap,
        deployments: CDeployment,
        replicasets: CReplicaSet,
        renderer: Renderer,
        config: ReconcileConfig,
        metrics: Metrics,
    ) -> Self {
        Self { configmaps, deployments, replicasets, renderer, config, metrics }
    }

    fn deployment_name(&self) -> String {
        format!("ingrate-{}-proxy", self.config.ingrate_name)
    }

    pub async fn reconcile(&self, snapshot: &Snapshot) -> Result<ReconcileOutcome> {
        let mut measure = self.metrics.measure_reconcile();
        let result = self.reconcile_inner(snapshot).await;
        if result.is_err() {
            measure.mark_failed();
        }
        result
    }

    async fn reconcile_inner(&self, snapshot: &Snapshot) -> Result<ReconcileOutcome> {
        let haproxy_cfg = self.renderer.render_haproxy_cfg(&build_config_context(snapshot))?;

        let deployment_name = self.deployment_name();
        let existing_deployment = self.deployments.get(&self.config.namespace, &deployment_name).await?;

        let mut data = BTreeMap::new();
        data.insert("haproxy.cfg".to_string(), haproxy_cfg);
        let configmap = self.validate_or_create_configmap(data, existing_deployment.as_ref()).await?;

        let deployment_ctx = DeploymentContext {
            ingrate_name: self.config.ingrate_name.clone(),
            serviceaccount_name: deployment_name.clone(),
            configmap_name: configmap.name_any(),
            image: self.config.image.clone(),
            replicas: self.config.replicas,
        };
        let deployment_yaml = self.renderer.render_deployment_yaml(&deployment_ctx)?;

        if let Some(existing) = &existing_deployment {
            if let Some(previous_yaml) = existing.annotations().get(DEPLOYMENT_YAML_ANNOTATION) {
                if previous_yaml != &deployment_yaml {
                    let diff = similar::TextDiff::from_lines(previous_yaml.as_str(), deployment_yaml.as_str());
                    tracing::info!(diff = %diff.unified_diff(), "deployment.yaml changed");
                }
            }
        }

        let mut deployment: Deployment =
            serde_yaml::from_str(&deployment_yaml).map_err(|e| Error::YamlParse("parsing rendered deployment.yaml".into(), Box::new(e)))?;
        self.init_deployment(&mut deployment, &configmap, &deployment_yaml);
        deployment.metadata.name = Some(deployment_name.clone());

        let replaced = self.replace_or_create_deployment(existing_deployment.is_some(), &deployment).await?;
        let updated = wait_for_revision(&self.deployments, &replaced).await?;

        let existing_revision = existing_deployment
            .as_ref()
            .and_then(|d| d.annotations().get(DEPLOYMENT_REVISION_ANNOTATION).cloned())
            .unwrap_or_default();
        let new_revision = updated.annotations().get(DEPLOYMENT_REVISION_ANNOTATION).cloned().unwrap_or_default();

        if new_revision == existing_revision {
            tracing::debug!("existing deployment suffices");
            return Ok(ReconcileOutcome::Unchanged);
        }

        tracing::info!(revision = %new_revision, "deployment revision is now rolling out");
        let replicaset = wait_for_replicaset(&self.replicasets, &updated).await?;
        self.add_configmap_owner_ref(&configmap, &replicaset).await?;

        Ok(ReconcileOutcome::RolledOut)
    }

    async fn validate_or_create_configmap(&self, data: BTreeMap<String, String>, existing_deployment: Option<&Deployment>) -> Result<ConfigMap> {
        let existing_configmap_name = existing_deployment.and_then(|d| d.annotations().get(INGRATE_CONFIGMAP_VERSION_ANNOTATION).cloned());

        if let Some(name) = &existing_configmap_name {
            if let Some(existing) = self.configmaps.get(&self.config.namespace, name).await? {
                if existing.data.as_ref() == Some(&data) {
                    tracing::info!(name = %existing.name_any(), "existing configmap is up to date");
                    return Ok(existing);
                }

                tracing::info!(name = %existing.name_any(), "existing configmap is not up to date");
                for (key, value) in &data {
                    match existing.data.as_ref().and_then(|d| d.get(key)) {
                        None => tracing::debug!(%key, "existing configmap is missing key"),
                        Some(existing_value) if existing_value != value => {
                            let diff = similar::TextDiff::from_lines(existing_value.as_str(), value.as_str());
                            tracing::info!(%key, diff = %diff.unified_diff(), "configmap key changed");
                        }
                        Some(_) => {}
                    }
                }
                for key in existing.data.iter().flatten().map(|(k, _)| k) {
                    if !data.contains_key(key) {
                        tracing::debug!(%key, "existing configmap has extra key");
                    }
                }
            }
        }

        let mut labels = BTreeMap::new();
        labels.insert(INGRATE_NAME_LABEL.to_string(), self.config.ingrate_name.clone());
        let configmap = ConfigMap {
            metadata: ObjectMeta {
                generate_name: Some(format!("ingrate-{}-", self.config.ingrate_name)),
                labels: Some(labels),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };

        let created = self.configmaps.create(&self.config.namespace, &configmap).await?;
        self.metrics.mark_configmap_rotation();
        tracing::info!(name = %created.name_any(), "created new configmap");
        Ok(created)
    }

    fn init_deployment(&self, deployment: &mut Deployment, configmap: &ConfigMap, deployment_yaml: &str) {
        let annotations = deployment.metadata.annotations.get_or_insert_with(BTreeMap::new);
        annotations.insert(INGRATE_CONFIGMAP_VERSION_ANNOTATION.to_string(), configmap.name_any());
        annotations.insert(DEPLOYMENT_YAML_ANNOTATION.to_string(), deployment_yaml.to_string());

        if let Some(spec) = deployment.spec.as_mut() {
            let template_meta = spec.template.metadata.get_or_insert_with(ObjectMeta::default);
            let labels = template_meta.labels.get_or_insert_with(BTreeMap::new);
            labels.insert(INGRATE_NAME_LABEL.to_string(), self.config.ingrate_name.clone());
        }
    }

    async fn replace_or_create_deployment(&self, existed: bool, deployment: &Deployment) -> Result<Deployment> {
        let name = deployment.name_any();
        let replaced = self.deployments.replace(&self.config.namespace, &name, deployment).await?;
        if existed {
            tracing::info!(%name, "updated deployment");
        } else {
            tracing::info!(%name, "created deployment");
        }
        Ok(replaced)
    }

    async fn add_configmap_owner_ref(&self, target: &ConfigMap, referrent: &ReplicaSet) -> Result<()> {
        let referrent_uid = referrent.uid();
        if target.owner_references().iter().any(|r| Some(&r.uid) == referrent_uid.as_ref()) {
            return Ok(());
        }

        tracing::info!(name = %target.name_any(), "updating owner references on configmap");
        let mut updated = target.clone();
        updated.metadata.owner_references.get_or_insert_with(Vec::new).push(OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "ReplicaSet".to_string(),
            name: referrent.name_any(),
            uid: referrent_uid.unwrap_or_default(),
            ..Default::default()
        });

        self.configmaps.replace(&self.config.namespace, &target.name_any(), &updated).await?;
        Ok(())
    }
}

/// Resolves a backend's target port to a concrete number against a named
/// service, preferring an explicit port number and falling back to
/// matching a named service port.
fn resolve_port(service: &Service, backend: &IngressServiceBackend) -> Option<i32> {
    let port = backend.port.as_ref()?;
    if let Some(number) = port.number {
        return Some(number);
    }
    let name = port_name(port)?;
    service.spec.as_ref()?.ports.iter().flatten().find(|p| p.name.as_deref() == Some(name)).map(|p| p.port)
}

fn port_name(port: &ServiceBackendPort) -> Option<&str> {
    port.name.as_deref()
}

/// Resolves one path's backend into the concrete `server` targets the
/// template renders: a single target for an ordinary service, or one
/// target per member of the release set when the backend names a
/// release-stub service.
fn resolve_servers(
    services: &BTreeMap<(String, String), Service>,
    release_map: &BTreeMap<(String, String), BTreeSet<String>>,
    namespace: &str,
    backend: &IngressServiceBackend,
) -> Vec<ServerView> {
    let stub_key = (namespace.to_string(), backend.name.clone());
    if let Some(members) = release_map.get(&stub_key) {
        return members
            .iter()
            .filter_map(|name| {
                let service = services.get(&(namespace.to_string(), name.clone()))?;
                let port = resolve_port(service, backend).unwrap_or(80);
                Some(ServerView { name: name.clone(), port })
            })
            .collect();
    }

    let port = services.get(&stub_key).and_then(|service| resolve_port(service, backend)).unwrap_or(80);
    vec![ServerView { name: backend.name.clone(), port }]
}

fn ingress_view(ing: &Ingress, services: &BTreeMap<(String, String), Service>, release_map: &BTreeMap<(String, String), BTreeSet<String>>) -> IngressView {
    let namespace = ing.namespace().unwrap_or_default();
    let mut rules = Vec::new();
    let mut tls_secrets = Vec::new();

    if let Some(spec) = &ing.spec {
        for rule in spec.rules.iter().flatten() {
            let Some(http) = &rule.http else { continue };
            let paths = http
                .paths
                .iter()
                .filter_map(|path| {
                    let backend = path.backend.service.as_ref()?;
                    let servers = resolve_servers(services, release_map, &namespace, backend);
                    let port = servers.first().map(|s| s.port).unwrap_or(80);
                    Some(PathView { path: path.path.clone().unwrap_or_else(|| "/".to_string()), service: backend.name.clone(), port, servers })
                })
                .collect();
            rules.push(RuleView { host: rule.host.clone(), paths });
        }
        for tls in spec.tls.iter().flatten() {
            if let Some(name) = &tls.secret_name {
                tls_secrets.push(name.clone());
            }
        }
    }

    IngressView { namespace, name: ing.name_any(), rules, tls_secrets }
}

pub fn build_config_context(snapshot: &Snapshot) -> ConfigContext {
    ConfigContext {
        ingresses: snapshot.ingresses.iter().map(|ing| ingress_view(ing, &snapshot.services, &snapshot.release_map)).collect(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use futures::StreamExt;
    use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
    use k8s_openapi::api::networking::v1::{HTTPIngressPath, HTTPIngressRuleValue, IngressBackend, IngressRule, IngressSpec};
    use prometheus_client::registry::Registry;

    use crate::k8s::FakeResourceClient;
    use crate::model::key_of;

    fn test_metrics() -> Metrics {
        let mut registry = Registry::default();
        Metrics::register(&mut registry)
    }

    fn make_ingress(namespace: &str, name: &str, host: &str, service: &str, port: i32) -> Ingress {
        Ingress {
            metadata: ObjectMeta { namespace: Some(namespace.to_string()), name: Some(name.to_string()), ..Default::default() },
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some(host.to_string()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend { name: service.to_string(), port: Some(ServiceBackendPort { number: Some(port), name: None }) }),
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

    fn make_service(namespace: &str, name: &str, port: i32) -> Service {
        Service {
            metadata: ObjectMeta { namespace: Some(namespace.to_string()), name: Some(name.to_string()), ..Default::default() },
            spec: Some(ServiceSpec { ports: Some(vec![ServicePort { port, ..Default::default() }]), ..Default::default() }),
            ..Default::default()
        }
    }

    fn make_snapshot(ingress: Ingress, service: Service) -> Snapshot {
        let mut services = BTreeMap::new();
        let key = key_of(&service.namespace().unwrap_or_default(), &service.name_any());
        services.insert(key, service);
        let mut snapshot = Snapshot { ingresses: vec![ingress], services, secrets: BTreeMap::new(), release_map: BTreeMap::new() };
        snapshot.sort_ingresses();
        snapshot
    }

    /// Stands in for the Deployment/ReplicaSet controllers neither
    /// `FakeResourceClient` nor this crate runs: watches for a deployment
    /// missing `deployment.kubernetes.io/revision`, assigns one (reusing
    /// the last one handed out when the rendered `deployment.yaml` is
    /// unchanged, matching how the real controller only bumps a revision
    /// on a pod template change), and creates the matching ReplicaSet.
    async fn spawn_fake_rollout_controller(
        deployments: FakeResourceClient<Deployment>,
        replicasets: FakeResourceClient<ReplicaSet>,
        namespace: String,
    ) -> tokio::task::JoinHandle<()> {
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            let watch = deployments.watch(&namespace, "", "0");
            futures::pin_mut!(watch);
            let _ = ready_tx.send(());
            let mut seen: BTreeMap<String, (String, String)> = BTreeMap::new();
            let mut next_revision: u64 = 0;
            while let Some(event) = watch.next().await {
                let Ok(event) = event else { continue };
                if event.is_deleted() {
                    continue;
                }
                let deployment = event.into_inner();
                if deployment.annotations().contains_key(DEPLOYMENT_REVISION_ANNOTATION) {
                    continue;
                }
                let name = deployment.name_any();
                let template = deployment.annotations().get(DEPLOYMENT_YAML_ANNOTATION).cloned().unwrap_or_default();
                let revision = match seen.get(&name) {
                    Some((revision, prev_template)) if prev_template == &template => revision.clone(),
                    _ => {
                        next_revision += 1;
                        let revision = next_revision.to_string();
                        seen.insert(name.clone(), (revision.clone(), template.clone()));

                        let ingrate_name = deployment.labels().get(INGRATE_NAME_LABEL).cloned().unwrap_or_default();
                        let mut rs_labels = BTreeMap::new();
                        rs_labels.insert(INGRATE_NAME_LABEL.to_string(), ingrate_name);
                        let mut rs_annotations = BTreeMap::new();
                        rs_annotations.insert(DEPLOYMENT_REVISION_ANNOTATION.to_string(), revision.clone());
                        let rs = ReplicaSet {
                            metadata: ObjectMeta {
                                name: Some(format!("{name}-{revision}")),
                                uid: Some(format!("uid-{name}-{revision}")),
                                labels: Some(rs_labels),
                                annotations: Some(rs_annotations),
                                ..Default::default()
                            },
                            ..Default::default()
                        };
                        replicasets.put(&namespace, rs);
                        revision
                    }
                };

                let mut revised = deployment.clone();
                revised.metadata.annotations.get_or_insert_with(BTreeMap::new).insert(DEPLOYMENT_REVISION_ANNOTATION.to_string(), revision);
                deployments.put(&namespace, revised);
            }
        });
        let _ = ready_rx.await;
        handle
    }

    #[allow(clippy::type_complexity)]
    async fn new_test_reconciler() -> (
        Reconciler<FakeResourceClient<ConfigMap>, FakeResourceClient<Deployment>, FakeResourceClient<ReplicaSet>>,
        FakeResourceClient<ConfigMap>,
        FakeResourceClient<Deployment>,
        FakeResourceClient<ReplicaSet>,
        tokio::task::JoinHandle<()>,
    ) {
        let configmaps = FakeResourceClient::<ConfigMap>::new();
        let deployments = FakeResourceClient::<Deployment>::new();
        let replicasets = FakeResourceClient::<ReplicaSet>::new();
        let controller = spawn_fake_rollout_controller(deployments.clone(), replicasets.clone(), "default".to_string()).await;

        let config = ReconcileConfig { namespace: "default".to_string(), ingrate_name: "demo".to_string(), image: "haproxy:2.8".to_string(), replicas: 1 };
        let renderer = Renderer::new().expect("templates parse");
        let reconciler = Reconciler::new(configmaps.clone(), deployments.clone(), replicasets.clone(), renderer, config, test_metrics());
        (reconciler, configmaps, deployments, replicasets, controller)
    }

    #[tokio::test]
    async fn first_reconcile_creates_configmap_and_rolls_out_with_pinned_owner_ref() {
        let (reconciler, configmaps, _deployments, replicasets, controller) = new_test_reconciler().await;
        let snapshot = make_snapshot(make_ingress("default", "web", "example.com", "web-svc", 80), make_service("default", "web-svc", 80));

        let outcome = reconciler.reconcile(&snapshot).await.expect("reconcile succeeds");
        assert_eq!(outcome, ReconcileOutcome::RolledOut);

        let listed = configmaps.list("default", "").await.expect("list configmaps");
        assert_eq!(listed.items.len(), 1);
        assert_eq!(configmaps.create_call_count(), 1);

        let configmap = &listed.items[0];
        assert!(configmap.data.as_ref().unwrap()["haproxy.cfg"].contains("example.com"));

        let replicaset_listed = replicasets.list("default", "").await.expect("list replicasets");
        assert_eq!(replicaset_listed.items.len(), 1);
        let owner_refs = configmap.owner_references();
        assert_eq!(owner_refs.len(), 1);
        assert_eq!(owner_refs[0].uid, replicaset_listed.items[0].uid().unwrap());

        controller.abort();
    }

    #[tokio::test]
    async fn second_reconcile_with_unchanged_data_reuses_the_configmap() {
        let (reconciler, configmaps, _deployments, _replicasets, controller) = new_test_reconciler().await;
        let snapshot = make_snapshot(make_ingress("default", "web", "example.com", "web-svc", 80), make_service("default", "web-svc", 80));

        reconciler.reconcile(&snapshot).await.expect("first reconcile succeeds");
        assert_eq!(configmaps.create_call_count(), 1);

        let outcome = reconciler.reconcile(&snapshot).await.expect("second reconcile succeeds");
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(configmaps.create_call_count(), 1, "identical rendered data must not create a second configmap");

        controller.abort();
    }

    #[tokio::test]
    async fn changing_the_backing_ingress_rotates_the_configmap_and_rolls_out() {
        let (reconciler, configmaps, _deployments, replicasets, controller) = new_test_reconciler().await;
        let snapshot_a = make_snapshot(make_ingress("default", "web", "example.com", "web-svc", 80), make_service("default", "web-svc", 80));
        reconciler.reconcile(&snapshot_a).await.expect("first reconcile succeeds");

        let snapshot_b = make_snapshot(make_ingress("default", "web", "other.example.com", "web-svc", 80), make_service("default", "web-svc", 80));
        let outcome = reconciler.reconcile(&snapshot_b).await.expect("second reconcile succeeds");

        assert_eq!(outcome, ReconcileOutcome::RolledOut);
        assert_eq!(configmaps.create_call_count(), 2, "a different rendered haproxy.cfg must rotate to a new configmap");
        assert_eq!(replicasets.list("default", "").await.unwrap().items.len(), 2);

        controller.abort();
    }

    #[tokio::test]
    async fn owner_ref_is_not_duplicated_across_reconciliations() {
        let configmaps = FakeResourceClient::<ConfigMap>::new();
        let deployments = FakeResourceClient::<Deployment>::new();
        let replicasets = FakeResourceClient::<ReplicaSet>::new();
        let config = ReconcileConfig { namespace: "default".to_string(), ingrate_name: "demo".to_string(), image: "haproxy:2.8".to_string(), replicas: 1 };
        let renderer = Renderer::new().expect("templates parse");
        let reconciler = Reconciler::new(configmaps.clone(), deployments, replicasets, renderer, config, test_metrics());

        let mut labels = BTreeMap::new();
        labels.insert(INGRATE_NAME_LABEL.to_string(), "demo".to_string());
        let seed = ConfigMap {
            metadata: ObjectMeta { generate_name: Some("ingrate-demo-".to_string()), labels: Some(labels), ..Default::default() },
            ..Default::default()
        };
        let configmap = configmaps.create("default", &seed).await.expect("seed configmap");
        let replicaset = ReplicaSet {
            metadata: ObjectMeta { name: Some("ingrate-demo-proxy-1".to_string()), uid: Some("uid-1".to_string()), ..Default::default() },
            ..Default::default()
        };

        reconciler.add_configmap_owner_ref(&configmap, &replicaset).await.expect("first call sets the owner ref");
        let after_first = configmaps.get("default", &configmap.name_any()).await.unwrap().unwrap();
        assert_eq!(after_first.owner_references().len(), 1);
        assert_eq!(configmaps.replace_call_count(), 1);

        reconciler.add_configmap_owner_ref(&after_first, &replicaset).await.expect("second call is a no-op");
        let after_second = configmaps.get("default", &configmap.name_any()).await.unwrap().unwrap();
        assert_eq!(after_second.owner_references().len(), 1, "owner reference must not be duplicated");
        assert_eq!(configmaps.replace_call_count(), 1, "the redundant call must not issue a second replace");
    }

    #[tokio::test]
    async fn a_broken_template_fails_the_cycle_without_writing_anything() {
        let configmaps = FakeResourceClient::<ConfigMap>::new();
        let deployments = FakeResourceClient::<Deployment>::new();
        let replicasets = FakeResourceClient::<ReplicaSet>::new();
        let config = ReconcileConfig { namespace: "default".to_string(), ingrate_name: "demo".to_string(), image: "haproxy:2.8".to_string(), replicas: 1 };
        let broken_renderer = Renderer::from_sources("{{ ingresses | nonexistent_filter }}", "kind: Deployment\n").expect("bad filter still parses");
        let reconciler = Reconciler::new(configmaps.clone(), deployments, replicasets, broken_renderer, config, test_metrics());

        let snapshot = make_snapshot(make_ingress("default", "web", "example.com", "web-svc", 80), make_service("default", "web-svc", 80));
        let result = reconciler.reconcile(&snapshot).await;

        assert!(result.is_err());
        assert_eq!(configmaps.create_call_count(), 0);
        assert_eq!(configmaps.list("default", "").await.unwrap().items.len(), 0);
    }

    /// A backend naming a release-stub service expands to one rendered
    /// `server` per service the stub's release-selector currently matches,
    /// rather than a single server naming the (non-existent) stub service.
    #[test]
    fn release_stub_backend_expands_to_every_matched_service() {
        let ingress = make_ingress("default", "web", "example.com", "web-releases", 80);
        let mut services = BTreeMap::new();
        services.insert(key_of("default", "web-v1"), make_service("default", "web-v1", 8080));
        services.insert(key_of("default", "web-v2"), make_service("default", "web-v2", 8080));

        let mut release_map = BTreeMap::new();
        release_map.insert(key_of("default", "web-releases"), BTreeSet::from(["web-v1".to_string(), "web-v2".to_string()]));

        let snapshot = Snapshot { ingresses: vec![ingress], services, secrets: BTreeMap::new(), release_map };
        let ctx = build_config_context(&snapshot);

        let path = &ctx.ingresses[0].rules[0].paths[0];
        let mut names: Vec<&str> = path.servers.iter().map(|s| s.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["web-v1", "web-v2"]);
        assert!(path.servers.iter().all(|s| s.port == 8080));
    }
}
