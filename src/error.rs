//! Error taxonomy shared by every component: one `thiserror`-derived enum
//! with a boxed source on every variant that wraps another crate's error
//! type, plus a couple of predicates over the transient cases reconciliation
//! treats specially.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}: {1:?}")]
    Kube(String, #[source] Box<kube::Error>),

    #[error("{0}: {1:?}")]
    TemplateRender(String, #[source] Box<tera::Error>),

    #[error("{0}: {1}")]
    YamlParse(String, #[source] Box<serde_yaml::Error>),

    #[error("{0}")]
    MissingData(String),

    #[error("watch stream closed: {0}")]
    StreamClosed(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl Error {
    pub fn kube(context: impl Into<String>, source: kube::Error) -> Self {
        Error::Kube(context.into(), Box::new(source))
    }

    /// `true` for a 409 Conflict: the reconciliation cycle is skipped, the
    /// next snapshot will observe the server's latest state via watch.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube(_, e) if matches!(e.as_ref(), kube::Error::Api(ae) if ae.code == 409))
    }

    /// `true` for a 422/validation rejection.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Error::Kube(_, e) if matches!(e.as_ref(), kube::Error::Api(ae) if ae.code == 422))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
