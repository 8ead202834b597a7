//! One garbage collection run: executor pods first, then CI namespaces.

use chrono::Utc;
use tracing::{info, instrument};

use crate::config::GcConfig;
use crate::error::{GcError, Result};
use crate::executors::reap_executor_pods;
use crate::kubernetes::{self, ClusterApi, KubeClusterApi};
use crate::namespaces::reap_ci_namespaces;

/// Report of what a run cleaned up
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Whether deletions were only simulated
    pub dry_run: bool,
    /// Executor pods deleted (or that would be deleted)
    pub executor_pods: Vec<String>,
    /// CI namespaces deleted (or that would be deleted)
    pub namespaces: Vec<String>,
}

impl RunReport {
    /// Get total items cleaned up.
    #[must_use]
    pub fn total(&self) -> usize {
        self.executor_pods.len() + self.namespaces.len()
    }

    /// Check if anything was cleaned up.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = if self.dry_run {
            "Would clean up"
        } else {
            "Cleaned up"
        };
        write!(
            f,
            "{verb}: {} executor pods, {} CI namespaces",
            self.executor_pods.len(),
            self.namespaces.len()
        )
    }
}

/// Run both passes against an existing cluster API.
///
/// A failure in the pod pass aborts the run before namespaces are looked at.
pub async fn collect(api: &dyn ClusterApi, config: &GcConfig) -> Result<RunReport> {
    let now = Utc::now();

    let executor_pods = reap_executor_pods(api, config, now).await?;
    info!(
        count = executor_pods.len(),
        dry_run = config.dry_run,
        "Executor pod pass finished"
    );

    let namespaces = reap_ci_namespaces(api, config, now).await?;
    info!(
        count = namespaces.len(),
        dry_run = config.dry_run,
        "CI namespace pass finished"
    );

    Ok(RunReport {
        dry_run: config.dry_run,
        executor_pods,
        namespaces,
    })
}

/// Connect to the cluster and run both passes under the configured deadline.
#[instrument(skip_all, fields(dry_run = config.dry_run))]
pub async fn run(config: &GcConfig) -> Result<RunReport> {
    config.validate()?;

    let deadline = config.timeout;
    tokio::time::timeout(deadline, async {
        let client = kubernetes::connect(config.kubeconfig.as_deref()).await?;
        let api = KubeClusterApi::new(client);
        collect(&api, config).await
    })
    .await
    .map_err(|_| GcError::Timeout(deadline))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::age::ResourceAge;
    use crate::config::ResourceKind;
    use crate::kubernetes::MockClusterApi;
    use chrono::{DateTime, Duration};
    use k8s_openapi::api::core::v1::{Namespace, Pod};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use std::collections::BTreeMap;

    fn meta(name: &str, created: DateTime<Utc>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            creation_timestamp: Some(Time(created)),
            ..Default::default()
        }
    }

    fn job_pod(name: &str, created: DateTime<Utc>) -> Pod {
        let mut metadata = meta(name, created);
        metadata.labels = Some(BTreeMap::from([(
            "app".to_string(),
            "gitlab-ci-job".to_string(),
        )]));
        Pod {
            metadata,
            ..Default::default()
        }
    }

    #[test]
    fn report_display_and_totals() {
        let report = RunReport {
            dry_run: false,
            executor_pods: vec!["a".to_string()],
            namespaces: vec!["b".to_string(), "c".to_string()],
        };
        assert_eq!(report.total(), 3);
        assert!(!report.is_empty());
        assert_eq!(
            report.to_string(),
            "Cleaned up: 1 executor pods, 2 CI namespaces"
        );

        let dry = RunReport {
            dry_run: true,
            ..RunReport::default()
        };
        assert!(dry.is_empty());
        assert!(dry.to_string().starts_with("Would clean up"));
    }

    #[tokio::test]
    async fn runs_pod_pass_then_namespace_pass() {
        let now = Utc::now();
        let old = now - Duration::hours(10);
        let namespace = "ci-build-3a5db1781ab7cde0c53a3b53d995b75e";

        let mut api = MockClusterApi::new();
        api.expect_list_pods().returning(move |ns| {
            if ns == "gitlab-runner" {
                Ok(vec![job_pod("runner-1-project-2-concurrent-0", old)])
            } else {
                Ok(vec![])
            }
        });
        api.expect_delete_pod().times(1).returning(|_, _| Ok(()));
        api.expect_list_namespaces().times(1).returning(move || {
            Ok(vec![
                Namespace {
                    metadata: meta("gitlab-runner", now - Duration::days(90)),
                    ..Default::default()
                },
                Namespace {
                    metadata: meta(namespace, old),
                    ..Default::default()
                },
            ])
        });
        api.expect_delete_namespace().times(1).returning(|_| Ok(()));

        let config = GcConfig {
            max_build_namespace_age: ResourceAge::from_secs(6 * 3600),
            age_sources: vec![ResourceKind::Namespace, ResourceKind::Pod],
            ..GcConfig::default()
        };

        let report = collect(&api, &config).await.unwrap();

        assert_eq!(report.executor_pods, vec!["runner-1-project-2-concurrent-0"]);
        assert_eq!(report.namespaces, vec![namespace]);
        assert!(!report.dry_run);
    }

    #[tokio::test]
    async fn pod_pass_failure_skips_namespace_pass() {
        let mut api = MockClusterApi::new();
        api.expect_list_pods().returning(|ns| {
            Err(GcError::Query {
                kind: "pods",
                scope: format!("namespace {ns}"),
                source: kube::Error::Api(kube::error::ErrorResponse {
                    status: "Failure".to_string(),
                    message: "unavailable".to_string(),
                    reason: "ServiceUnavailable".to_string(),
                    code: 503,
                }),
            })
        });
        api.expect_list_namespaces().never();

        let result = collect(&api, &GcConfig::default()).await;
        assert!(matches!(result, Err(GcError::Query { .. })));
    }

    #[tokio::test]
    async fn run_rejects_invalid_config_before_connecting() {
        let config = GcConfig {
            age_sources: vec![],
            ..GcConfig::default()
        };

        assert!(matches!(run(&config).await, Err(GcError::Config(_))));
    }
}
