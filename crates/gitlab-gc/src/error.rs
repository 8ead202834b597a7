//! Error types for the garbage collector.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while collecting CI garbage
#[derive(Debug, Error)]
pub enum GcError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to read kubeconfig {path}: {source}")]
    Kubeconfig {
        path: String,
        #[source]
        source: kube::config::KubeconfigError,
    },

    #[error("Failed to build Kubernetes client: {0}")]
    Client(#[source] kube::Error),

    #[error("Failed to list {kind} in {scope}: {source}")]
    Query {
        kind: &'static str,
        scope: String,
        #[source]
        source: kube::Error,
    },

    #[error("Failed to delete {kind} {name}: {source}")]
    Delete {
        kind: &'static str,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("No resource age could be determined for namespace {namespace}")]
    NoResourceAges { namespace: String },

    #[error("Invalid TTL annotation value {value:?} on namespace {namespace}: {reason}")]
    InvalidTtl {
        namespace: String,
        value: String,
        reason: String,
    },

    #[error("Namespace {namespace}: {source}")]
    Namespace {
        namespace: String,
        #[source]
        source: Box<GcError>,
    },

    #[error("Cleanup run exceeded timeout of {0:?}")]
    Timeout(Duration),
}

impl GcError {
    /// Attach the namespace under evaluation to an error.
    #[must_use]
    pub fn in_namespace(self, namespace: &str) -> Self {
        Self::Namespace {
            namespace: namespace.to_string(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, GcError>;
