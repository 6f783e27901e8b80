//! Renders the HAProxy config and the Deployment manifest from a snapshot.
//! Template content is intentionally minimal; the renderer itself — context
//! building, parse-time failure, and render-time failure — is the real
//! surface under test.

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::{Error, Result};

const HAPROXY_CFG_TEMPLATE: &str = include_str!("../templates/haproxy.cfg.tera");
const DEPLOYMENT_TEMPLATE: &str = include_str!("../templates/deployment.yaml.tera");

/// One concrete HAProxy `server` line. A path normally resolves to a
/// single target; a backend naming a release-stub service resolves to one
/// `ServerView` per service the stub's `release-selector` currently
/// matches, so the generated backend load balances across the release set
/// instead of naming the (non-existent) stub service directly.
#[derive(Debug, Clone, Serialize)]
pub struct ServerView {
    pub name: String,
    pub port: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathView {
    pub path: String,
    pub service: String,
    pub port: i32,
    pub servers: Vec<ServerView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleView {
    pub host: Option<String>,
    pub paths: Vec<PathView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngressView {
    pub namespace: String,
    pub name: String,
    pub rules: Vec<RuleView>,
    pub tls_secrets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ConfigContext {
    pub ingresses: Vec<IngressView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentContext {
    pub ingrate_name: String,
    pub serviceaccount_name: String,
    pub configmap_name: String,
    pub image: String,
    pub replicas: i32,
}

/// Owns one parsed `Tera` instance; template parse failures are fatal at
/// startup, since they indicate a broken build rather than transient
/// cluster state.
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    pub fn new() -> Result<Self> {
        Self::from_sources(HAPROXY_CFG_TEMPLATE, DEPLOYMENT_TEMPLATE)
    }

    /// Builds a renderer from arbitrary template sources instead of the
    /// embedded defaults, so a test can exercise a deliberately broken
    /// template and confirm a render failure skips the reconcile cycle
    /// without writing anything.
    pub fn from_sources(haproxy_cfg_template: &str, deployment_template: &str) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template("haproxy.cfg", haproxy_cfg_template)
            .map_err(|e| Error::TemplateRender("parsing haproxy.cfg template".into(), Box::new(e)))?;
        tera.add_raw_template("deployment.yaml", deployment_template)
            .map_err(|e| Error::TemplateRender("parsing deployment.yaml template".into(), Box::new(e)))?;
        Ok(Self { tera })
    }

    pub fn render_haproxy_cfg(&self, ctx: &ConfigContext) -> Result<String> {
        let context = Context::from_serialize(ctx).map_err(|e| Error::TemplateRender("building haproxy.cfg context".into(), Box::new(e)))?;
        self.tera
            .render("haproxy.cfg", &context)
            .map_err(|e| Error::TemplateRender("rendering haproxy.cfg".into(), Box::new(e)))
    }

    pub fn render_deployment_yaml(&self, ctx: &DeploymentContext) -> Result<String> {
        let context = Context::from_serialize(ctx).map_err(|e| Error::TemplateRender("building deployment.yaml context".into(), Box::new(e)))?;
        self.tera
            .render("deployment.yaml", &context)
            .map_err(|e| Error::TemplateRender("rendering deployment.yaml".into(), Box::new(e)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_an_empty_config_without_error() {
        let renderer = Renderer::new().expect("templates parse");
        let rendered = renderer.render_haproxy_cfg(&ConfigContext::default()).expect("renders");
        assert!(rendered.contains("global"));
    }

    #[test]
    fn renders_a_single_rule() {
        let renderer = Renderer::new().expect("templates parse");
        let ctx = ConfigContext {
            ingresses: vec![IngressView {
                namespace: "default".into(),
                name: "web".into(),
                rules: vec![RuleView {
                    host: Some("example.com".into()),
                    paths: vec![PathView {
                        path: "/".into(),
                        service: "default-web".into(),
                        port: 80,
                        servers: vec![ServerView { name: "default-web".into(), port: 80 }],
                    }],
                }],
                tls_secrets: vec![],
            }],
        };
        let rendered = renderer.render_haproxy_cfg(&ctx).expect("renders");
        assert!(rendered.contains("example.com"));
        assert!(rendered.contains("default-web"));
    }
}
