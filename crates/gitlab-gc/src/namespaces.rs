//! CI namespace reaper pass.

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::{debug, info};

use crate::config::GcConfig;
use crate::error::Result;
use crate::kubernetes::ClusterApi;
use crate::policy::{Decision, KeepReason, RetentionPolicy};

/// Delete CI namespaces whose retention has expired.
///
/// Returns the names of the deleted namespaces, or in dry-run mode the names
/// that would have been deleted. The first failing namespace aborts the pass.
pub async fn reap_ci_namespaces(
    api: &dyn ClusterApi,
    config: &GcConfig,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let policy = RetentionPolicy::new(config);
    let namespaces = api.list_namespaces().await?;

    info!(
        count = namespaces.len(),
        dry_run = config.dry_run,
        "Evaluating namespaces"
    );

    let mut deleted = Vec::new();
    for namespace in &namespaces {
        let name = namespace.name_any();
        let decision = policy
            .evaluate(api, namespace, now)
            .await
            .map_err(|e| e.in_namespace(&name))?;

        let (age, threshold) = match decision {
            Decision::Keep {
                reason,
                age: Some(age),
                threshold: Some(threshold),
            } => {
                info!(
                    namespace = %name,
                    age = age.as_secs(),
                    max_age = threshold.max_age.as_secs(),
                    threshold = %threshold.source,
                    %reason,
                    "Keeping namespace"
                );
                continue;
            }
            Decision::Keep {
                reason: reason @ (KeepReason::Terminating | KeepReason::OptedOut),
                ..
            } => {
                info!(namespace = %name, %reason, "Keeping namespace");
                continue;
            }
            Decision::Keep { reason, .. } => {
                debug!(namespace = %name, %reason, "Skipping namespace");
                continue;
            }
            Decision::Delete { age, threshold } => (age, threshold),
        };

        if config.dry_run {
            info!(
                namespace = %name,
                age = age.as_secs(),
                max_age = threshold.max_age.as_secs(),
                threshold = %threshold.source,
                age_hours = age.hours(),
                age_days = age.days(),
                "Would delete namespace (dry run)"
            );
        } else {
            info!(
                namespace = %name,
                age = age.as_secs(),
                max_age = threshold.max_age.as_secs(),
                threshold = %threshold.source,
                age_hours = age.hours(),
                age_days = age.days(),
                "Deleting namespace"
            );
            api.delete_namespace(&name).await?;
        }

        deleted.push(name);
    }

    Ok(deleted)
}
