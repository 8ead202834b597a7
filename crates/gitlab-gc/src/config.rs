//! Collector configuration.
//!
//! [`GcConfig`] is built once at startup from the command line and passed
//! down to both passes; nothing reads flags or environment after that.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::age::ResourceAge;
use crate::error::{GcError, Result};

pub const DEFAULT_RUNNER_NAMESPACE: &str = "gitlab-runner";
pub const DEFAULT_PROTECTED_BRANCHES: &str = "develop,master,main,preview,review,stage,staging";
pub const DEFAULT_OPT_OUT_ANNOTATIONS: &str = "disable-automatic-garbage-collection";
pub const DEFAULT_AGE_SOURCES: &str = "namespace,pod,deployment,statefulset,daemonset,cronjob";
pub const DEFAULT_TTL_ANNOTATION: &str = "k8s-gitlab-gc/ttl";

/// 70 minutes
pub const DEFAULT_MAX_EXECUTOR_AGE_SECS: u64 = 70 * 60;
/// 2 days
pub const DEFAULT_MAX_REVIEW_NAMESPACE_AGE_SECS: u64 = 60 * 60 * 24 * 2;
/// 2 hours
pub const DEFAULT_MAX_BUILD_NAMESPACE_AGE_SECS: u64 = 60 * 60 * 2;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Resource kinds whose youngest instance can determine a namespace's age
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Namespace,
    Pod,
    Deployment,
    StatefulSet,
    DaemonSet,
    CronJob,
}

impl ResourceKind {
    pub const ALL: [Self; 6] = [
        Self::Namespace,
        Self::Pod,
        Self::Deployment,
        Self::StatefulSet,
        Self::DaemonSet,
        Self::CronJob,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Pod => "pod",
            Self::Deployment => "deployment",
            Self::StatefulSet => "statefulset",
            Self::DaemonSet => "daemonset",
            Self::CronJob => "cronjob",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = GcError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == key)
            .ok_or_else(|| {
                GcError::Config(format!(
                    "unknown resource kind {s:?}, expected one of: {DEFAULT_AGE_SOURCES}"
                ))
            })
    }
}

/// How executor pods in the runner namespace are recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorPodMatch {
    /// Label `app=gitlab-ci-job`, set by the GitLab Kubernetes executor
    #[default]
    Label,
    /// Pod name tagged by `project` (older runner naming scheme)
    Name,
}

/// Validated collector configuration
#[derive(Debug, Clone, Serialize)]
pub struct GcConfig {
    /// Kubeconfig path; `None` infers in-cluster configuration
    pub kubeconfig: Option<PathBuf>,
    /// Log decisions without deleting anything
    pub dry_run: bool,
    /// Namespace the GitLab runner spawns executor pods in
    pub runner_namespace: String,
    /// Branch tokens that protect a namespace from deletion
    pub protected_branches: Vec<String>,
    pub max_executor_age: ResourceAge,
    /// Threshold for named (human branch) review namespaces
    pub max_review_namespace_age: ResourceAge,
    /// Threshold for hash-based build/test namespaces
    pub max_build_namespace_age: ResourceAge,
    /// Annotations that opt a namespace out when set to "true"
    pub opt_out_annotations: Vec<String>,
    /// Resource kinds consulted for a namespace's youngest age, in order
    pub age_sources: Vec<ResourceKind>,
    /// Annotation carrying a per-namespace TTL override
    pub ttl_annotation: String,
    pub executor_pod_match: ExecutorPodMatch,
    /// Deadline for the whole run
    #[serde(rename = "timeout_secs", serialize_with = "serialize_secs")]
    pub timeout: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            dry_run: false,
            runner_namespace: DEFAULT_RUNNER_NAMESPACE.to_string(),
            protected_branches: split_list(DEFAULT_PROTECTED_BRANCHES),
            max_executor_age: secs(DEFAULT_MAX_EXECUTOR_AGE_SECS),
            max_review_namespace_age: secs(DEFAULT_MAX_REVIEW_NAMESPACE_AGE_SECS),
            max_build_namespace_age: secs(DEFAULT_MAX_BUILD_NAMESPACE_AGE_SECS),
            opt_out_annotations: split_list(DEFAULT_OPT_OUT_ANNOTATIONS),
            age_sources: ResourceKind::ALL.to_vec(),
            ttl_annotation: DEFAULT_TTL_ANNOTATION.to_string(),
            executor_pod_match: ExecutorPodMatch::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl GcConfig {
    /// Validate configuration has the fields the passes rely on
    pub fn validate(&self) -> Result<()> {
        if self.runner_namespace.trim().is_empty() {
            return Err(GcError::Config(
                "gitlabRunnerNamespace must not be empty".to_string(),
            ));
        }

        if self.age_sources.is_empty() {
            return Err(GcError::Config(
                "onlyUseAgesOf must name at least one resource kind".to_string(),
            ));
        }

        if self.ttl_annotation.trim().is_empty() {
            return Err(GcError::Config("ttlAnnotation must not be empty".to_string()));
        }

        if self.timeout.is_zero() {
            return Err(GcError::Config("timeout must be positive".to_string()));
        }

        Ok(())
    }
}

/// Parse the resource kind selector, dropping blanks and duplicates.
pub fn parse_age_sources<S: AsRef<str>>(keys: &[S]) -> Result<Vec<ResourceKind>> {
    let mut kinds = Vec::new();
    for key in keys.iter().map(AsRef::as_ref).filter(|k| !k.trim().is_empty()) {
        let kind: ResourceKind = key.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

/// Split a comma separated list, trimming entries and dropping empty ones.
#[must_use]
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Clamp a flag value in seconds into a [`ResourceAge`].
#[must_use]
pub fn secs(value: u64) -> ResourceAge {
    ResourceAge::from_secs(i64::try_from(value).unwrap_or(i64::MAX))
}

fn serialize_secs<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}
