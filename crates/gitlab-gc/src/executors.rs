//! GitLab executor pod reaper pass.
//!
//! The GitLab Kubernetes executor starts one pod per CI job in the runner
//! namespace. Pods of jobs that hang or lose their runner are never cleaned
//! up by GitLab itself; this pass removes the ones that outlived
//! `maxGitlabExecutorAge`.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::age::ResourceAge;
use crate::classify;
use crate::config::{ExecutorPodMatch, GcConfig};
use crate::error::Result;
use crate::kubernetes::ClusterApi;

/// Returns true if the pod is a CI job pod under the configured rule.
#[must_use]
pub fn is_executor_pod(pod: &Pod, rule: ExecutorPodMatch) -> bool {
    match rule {
        ExecutorPodMatch::Label => classify::is_gitlab_job_pod(&pod.metadata),
        ExecutorPodMatch::Name => classify::is_tagged_by(&pod.name_any(), classify::PROJECT_TAG),
    }
}

/// Delete executor pods older than the configured max age.
///
/// Returns the names of the deleted pods, or in dry-run mode the names that
/// would have been deleted.
pub async fn reap_executor_pods(
    api: &dyn ClusterApi,
    config: &GcConfig,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let namespace = config.runner_namespace.as_str();
    let pods = api.list_pods(namespace).await?;

    info!(
        namespace,
        count = pods.len(),
        rule = ?config.executor_pod_match,
        dry_run = config.dry_run,
        "Evaluating executor pods"
    );

    let mut deleted = Vec::new();
    for pod in &pods {
        let name = pod.name_any();

        if !is_executor_pod(pod, config.executor_pod_match) {
            debug!(pod = %name, "Not an executor pod");
            continue;
        }

        let age = ResourceAge::since(pod.metadata.creation_timestamp.as_ref(), now);
        let max_age = config.max_executor_age;
        if age < max_age {
            debug!(pod = %name, age = age.as_secs(), max_age = max_age.as_secs(), "Keeping executor pod");
            continue;
        }

        if config.dry_run {
            info!(
                namespace,
                pod = %name,
                age = age.as_secs(),
                max_age = max_age.as_secs(),
                age_hours = age.hours(),
                "Would delete executor pod (dry run)"
            );
        } else {
            info!(
                namespace,
                pod = %name,
                age = age.as_secs(),
                max_age = max_age.as_secs(),
                age_hours = age.hours(),
                "Deleting executor pod"
            );
            api.delete_pod(namespace, &name).await?;
        }

        deleted.push(name);
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GcError;
    use crate::kubernetes::MockClusterApi;
    use chrono::Duration;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use mockall::predicate::eq;
    use std::collections::BTreeMap;

    fn pod(name: &str, job_label: bool, created: DateTime<Utc>) -> Pod {
        let labels = job_label.then(|| {
            BTreeMap::from([("app".to_string(), "gitlab-ci-job".to_string())])
        });
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels,
                creation_timestamp: Some(Time(created)),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn config(rule: ExecutorPodMatch, dry_run: bool) -> GcConfig {
        GcConfig {
            executor_pod_match: rule,
            dry_run,
            ..GcConfig::default()
        }
    }

    fn runner_pods(now: DateTime<Utc>) -> Vec<Pod> {
        vec![
            pod("runner-abc-project-12-concurrent-0", true, now - Duration::hours(3)),
            pod("runner-abc-project-13-concurrent-1", true, now - Duration::minutes(10)),
            pod("gitlab-runner-7d9f8-xk2p", false, now - Duration::days(20)),
            pod("runner-legacy-project-9-build", false, now - Duration::hours(5)),
        ]
    }

    #[test]
    fn label_rule_matches_job_label_only() {
        let now = Utc::now();
        let labelled = pod("anything", true, now);
        let named = pod("runner-x-project-1-concurrent-0", false, now);

        assert!(is_executor_pod(&labelled, ExecutorPodMatch::Label));
        assert!(!is_executor_pod(&named, ExecutorPodMatch::Label));
    }

    #[test]
    fn name_rule_matches_project_segment_only() {
        let now = Utc::now();
        let labelled = pod("anything", true, now);
        let named = pod("runner-x-project-1-concurrent-0", false, now);
        let lookalike = pod("projects-runner", false, now);

        assert!(!is_executor_pod(&labelled, ExecutorPodMatch::Name));
        assert!(is_executor_pod(&named, ExecutorPodMatch::Name));
        assert!(!is_executor_pod(&lookalike, ExecutorPodMatch::Name));
    }

    #[tokio::test]
    async fn deletes_old_labelled_job_pods() {
        let now = Utc::now();
        let mut api = MockClusterApi::new();
        api.expect_list_pods()
            .with(eq("gitlab-runner"))
            .times(1)
            .returning(move |_| Ok(runner_pods(now)));
        api.expect_delete_pod()
            .with(eq("gitlab-runner"), eq("runner-abc-project-12-concurrent-0"))
            .times(1)
            .returning(|_, _| Ok(()));

        let deleted = reap_executor_pods(&api, &config(ExecutorPodMatch::Label, false), now)
            .await
            .unwrap();

        assert_eq!(deleted, vec!["runner-abc-project-12-concurrent-0"]);
    }

    #[tokio::test]
    async fn name_rule_selects_project_tagged_pods() {
        let now = Utc::now();
        let mut api = MockClusterApi::new();
        api.expect_list_pods()
            .returning(move |_| Ok(runner_pods(now)));
        api.expect_delete_pod().times(2).returning(|_, _| Ok(()));

        let deleted = reap_executor_pods(&api, &config(ExecutorPodMatch::Name, false), now)
            .await
            .unwrap();

        assert_eq!(
            deleted,
            vec![
                "runner-abc-project-12-concurrent-0",
                "runner-legacy-project-9-build"
            ]
        );
    }

    #[tokio::test]
    async fn dry_run_reports_without_deleting() {
        let now = Utc::now();
        let mut api = MockClusterApi::new();
        api.expect_list_pods()
            .returning(move |_| Ok(runner_pods(now)));
        api.expect_delete_pod().never();

        let would_delete = reap_executor_pods(&api, &config(ExecutorPodMatch::Label, true), now)
            .await
            .unwrap();

        assert_eq!(would_delete, vec!["runner-abc-project-12-concurrent-0"]);
    }

    #[tokio::test]
    async fn pod_at_exact_max_age_is_deleted() {
        let now = Utc::now();
        let mut api = MockClusterApi::new();
        api.expect_list_pods().returning(move |_| {
            Ok(vec![pod("job", true, now - Duration::seconds(4200))])
        });
        api.expect_delete_pod().times(1).returning(|_, _| Ok(()));

        let deleted = reap_executor_pods(&api, &config(ExecutorPodMatch::Label, false), now)
            .await
            .unwrap();
        assert_eq!(deleted, vec!["job"]);
    }

    #[tokio::test]
    async fn list_failure_aborts_the_pass() {
        let mut api = MockClusterApi::new();
        api.expect_list_pods().returning(|namespace| {
            Err(GcError::Query {
                kind: "pods",
                scope: format!("namespace {namespace}"),
                source: kube::Error::Api(kube::error::ErrorResponse {
                    status: "Failure".to_string(),
                    message: "namespaces \"gitlab-runner\" not found".to_string(),
                    reason: "NotFound".to_string(),
                    code: 404,
                }),
            })
        });
        api.expect_delete_pod().never();

        let err = reap_executor_pods(&api, &config(ExecutorPodMatch::Label, false), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, GcError::Query { kind: "pods", .. }));
    }

    #[tokio::test]
    async fn delete_failure_is_surfaced() {
        let now = Utc::now();
        let mut api = MockClusterApi::new();
        api.expect_list_pods().returning(move |_| {
            Ok(vec![
                pod("first", true, now - Duration::hours(2)),
                pod("second", true, now - Duration::hours(2)),
            ])
        });
        api.expect_delete_pod()
            .times(1)
            .returning(|namespace, name| {
                Err(GcError::Delete {
                    kind: "pod",
                    name: format!("{namespace}/{name}"),
                    source: kube::Error::Api(kube::error::ErrorResponse {
                        status: "Failure".to_string(),
                        message: "forbidden".to_string(),
                        reason: "Forbidden".to_string(),
                        code: 403,
                    }),
                })
            });

        let err = reap_executor_pods(&api, &config(ExecutorPodMatch::Label, false), now)
            .await
            .unwrap_err();
        assert!(matches!(err, GcError::Delete { ref name, .. } if name == "gitlab-runner/first"));
    }
}
