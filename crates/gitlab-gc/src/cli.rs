//! Command line surface.
//!
//! Flag names follow the ones the collector has always been deployed with
//! (`--maxBuildNamespaceAge` and friends), so existing CronJob manifests keep
//! working. Every flag can also be supplied through a `GC_*` environment
//! variable.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::{
    parse_age_sources, secs, split_list, ExecutorPodMatch, GcConfig, DEFAULT_AGE_SOURCES,
    DEFAULT_MAX_BUILD_NAMESPACE_AGE_SECS, DEFAULT_MAX_EXECUTOR_AGE_SECS,
    DEFAULT_MAX_REVIEW_NAMESPACE_AGE_SECS, DEFAULT_OPT_OUT_ANNOTATIONS,
    DEFAULT_PROTECTED_BRANCHES, DEFAULT_RUNNER_NAMESPACE, DEFAULT_TIMEOUT_SECS,
    DEFAULT_TTL_ANNOTATION,
};
use crate::error::GcError;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Garbage collector for GitLab CI executor pods and CI namespaces.
#[derive(Debug, Parser)]
#[command(
    name = "k8s-gitlab-gc",
    version,
    about = "Delete stale GitLab CI executor pods and CI namespaces",
    long_about = "Delete stale GitLab CI executor pods and CI namespaces.\n\n\
                  Executor pods in the runner namespace are removed once they outlive\n\
                  --maxGitlabExecutorAge. Namespaces whose names carry a `ci` segment\n\
                  are removed once their youngest resource is older than the review or\n\
                  build threshold, unless protected by branch name or annotation."
)]
pub struct Cli {
    /// Path to a kubeconfig file (empty uses in-cluster configuration)
    #[arg(long, env = "GC_KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Log what would be deleted without deleting anything
    #[arg(long = "dry-run", env = "GC_DRY_RUN")]
    pub dry_run: bool,

    /// Namespace the GitLab runner starts executor pods in
    #[arg(
        long = "gitlabRunnerNamespace",
        env = "GC_GITLAB_RUNNER_NAMESPACE",
        default_value = DEFAULT_RUNNER_NAMESPACE
    )]
    pub runner_namespace: String,

    /// Comma separated branch names that protect a namespace
    #[arg(
        long = "protectedBranches",
        env = "GC_PROTECTED_BRANCHES",
        default_value = DEFAULT_PROTECTED_BRANCHES
    )]
    pub protected_branches: String,

    /// Max age of executor pods in seconds
    #[arg(
        long = "maxGitlabExecutorAge",
        env = "GC_MAX_GITLAB_EXECUTOR_AGE",
        default_value_t = DEFAULT_MAX_EXECUTOR_AGE_SECS
    )]
    pub max_executor_age: u64,

    /// Max age of review namespaces in seconds
    #[arg(
        long = "maxReviewNamespaceAge",
        env = "GC_MAX_REVIEW_NAMESPACE_AGE",
        default_value_t = DEFAULT_MAX_REVIEW_NAMESPACE_AGE_SECS
    )]
    pub max_review_namespace_age: u64,

    /// Max age of hash-based build namespaces in seconds
    #[arg(
        long = "maxBuildNamespaceAge",
        env = "GC_MAX_BUILD_NAMESPACE_AGE",
        default_value_t = DEFAULT_MAX_BUILD_NAMESPACE_AGE_SECS
    )]
    pub max_build_namespace_age: u64,

    /// Comma separated annotations that disable collection when set to "true"
    #[arg(
        long = "optOutAnnotations",
        env = "GC_OPT_OUT_ANNOTATIONS",
        default_value = DEFAULT_OPT_OUT_ANNOTATIONS
    )]
    pub opt_out_annotations: String,

    /// Comma separated resource kinds used to determine a namespace's age
    #[arg(
        long = "onlyUseAgesOf",
        env = "GC_ONLY_USE_AGES_OF",
        default_value = DEFAULT_AGE_SOURCES
    )]
    pub only_use_ages_of: String,

    /// Namespace annotation holding a TTL that overrides the max age
    #[arg(
        long = "ttlAnnotation",
        env = "GC_TTL_ANNOTATION",
        default_value = DEFAULT_TTL_ANNOTATION
    )]
    pub ttl_annotation: String,

    /// How executor pods are recognised
    #[arg(
        long = "executorPodMatch",
        env = "GC_EXECUTOR_POD_MATCH",
        value_enum,
        default_value_t = ExecutorPodMatch::Label
    )]
    pub executor_pod_match: ExecutorPodMatch,

    /// Deadline for the whole run in seconds
    #[arg(long, env = "GC_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Log output format
    #[arg(long = "log-format", env = "GC_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Enable debug logging for the collector
    #[arg(short, long, env = "GC_VERBOSE")]
    pub verbose: bool,
}

impl TryFrom<Cli> for GcConfig {
    type Error = GcError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let kubeconfig = cli
            .kubeconfig
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        let config = Self {
            kubeconfig,
            dry_run: cli.dry_run,
            runner_namespace: cli.runner_namespace.trim().to_string(),
            protected_branches: split_list(&cli.protected_branches),
            max_executor_age: secs(cli.max_executor_age),
            max_review_namespace_age: secs(cli.max_review_namespace_age),
            max_build_namespace_age: secs(cli.max_build_namespace_age),
            opt_out_annotations: split_list(&cli.opt_out_annotations),
            age_sources: parse_age_sources(&split_list(&cli.only_use_ages_of))?,
            ttl_annotation: cli.ttl_annotation.trim().to_string(),
            executor_pod_match: cli.executor_pod_match,
            timeout: Duration::from_secs(cli.timeout),
        };
        config.validate()?;
        Ok(config)
    }
}
