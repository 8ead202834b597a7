//! Resource ages and the youngest-age aggregation.
//!
//! A namespace can look old by its own creation time while still holding a
//! pod that was created seconds ago by a retried job. The retention policy
//! therefore looks at the youngest object across several resource kinds and
//! uses that as the namespace's effective age.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use tracing::debug;

use crate::config::ResourceKind;
use crate::error::Result;
use crate::kubernetes::ClusterApi;

/// Elapsed lifetime of a Kubernetes object in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ResourceAge(i64);

impl ResourceAge {
    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    #[must_use]
    pub const fn as_secs(self) -> i64 {
        self.0
    }

    /// Age of an object created at `created`, measured at `now`.
    ///
    /// Objects without a creation timestamp are treated as brand new.
    #[must_use]
    pub fn since(created: Option<&Time>, now: DateTime<Utc>) -> Self {
        created.map_or(Self(0), |created| Self((now - created.0).num_seconds()))
    }

    #[must_use]
    pub const fn hours(self) -> i64 {
        self.0 / 60 / 60
    }

    #[must_use]
    pub const fn days(self) -> i64 {
        self.0 / 60 / 60 / 24
    }
}

impl fmt::Display for ResourceAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Youngest age among `items`, or `None` if there are no items.
pub fn youngest_item_age<K: Resource>(items: &[K], now: DateTime<Utc>) -> Option<ResourceAge> {
    items
        .iter()
        .map(|item| ResourceAge::since(item.meta().creation_timestamp.as_ref(), now))
        .min()
}

/// A source of "youngest resource age" for a namespace.
///
/// `Ok(None)` means the namespace holds no object of that kind, which is a
/// normal outcome and distinct from a failed query.
#[async_trait]
pub trait AgeSignal: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn youngest_age(
        &self,
        api: &dyn ClusterApi,
        namespace: &Namespace,
        now: DateTime<Utc>,
    ) -> Result<Option<ResourceAge>>;
}

#[async_trait]
impl AgeSignal for ResourceKind {
    fn name(&self) -> &'static str {
        self.as_str()
    }

    async fn youngest_age(
        &self,
        api: &dyn ClusterApi,
        namespace: &Namespace,
        now: DateTime<Utc>,
    ) -> Result<Option<ResourceAge>> {
        let name = namespace.name_any();
        let age = match self {
            Self::Namespace => Some(ResourceAge::since(
                namespace.metadata.creation_timestamp.as_ref(),
                now,
            )),
            Self::Pod => youngest_item_age(&api.list_pods(&name).await?, now),
            Self::Deployment => youngest_item_age(&api.list_deployments(&name).await?, now),
            Self::StatefulSet => youngest_item_age(&api.list_stateful_sets(&name).await?, now),
            Self::DaemonSet => youngest_item_age(&api.list_daemon_sets(&name).await?, now),
            Self::CronJob => youngest_item_age(&api.list_cron_jobs(&name).await?, now),
        };
        Ok(age)
    }
}

/// Youngest age across all signals that found something.
///
/// Signals are queried in order and the first query error aborts the
/// aggregation. Signals reporting nothing are skipped; if none reports a
/// value (or `signals` is empty) the result is `Ok(None)`.
pub async fn youngest_age<S: AgeSignal>(
    signals: &[S],
    api: &dyn ClusterApi,
    namespace: &Namespace,
    now: DateTime<Utc>,
) -> Result<Option<ResourceAge>> {
    let mut youngest: Option<ResourceAge> = None;

    for signal in signals {
        let Some(age) = signal.youngest_age(api, namespace, now).await? else {
            debug!(
                namespace = %namespace.name_any(),
                signal = signal.name(),
                "No resources found for age signal"
            );
            continue;
        };

        youngest = Some(youngest.map_or(age, |current| current.min(age)));
    }

    Ok(youngest)
}
