//! Retention policy for CI namespaces.
//!
//! The policy is a single decision function: it looks at one namespace
//! snapshot and answers keep or delete. It never mutates the cluster; the
//! only API calls it makes are the list calls behind the age signals.

use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;

use crate::age::{youngest_age, ResourceAge};
use crate::classify;
use crate::config::{GcConfig, ResourceKind};
use crate::error::{GcError, Result};
use crate::kubernetes::ClusterApi;

/// Why a namespace is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepReason {
    Terminating,
    Protected,
    NotCi,
    OptedOut,
    /// Youngest resource is below the threshold
    InUse,
}

impl fmt::Display for KeepReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Terminating => "namespace is terminating",
            Self::Protected => "namespace matches a protected branch",
            Self::NotCi => "namespace is not tagged as ci",
            Self::OptedOut => "namespace opted out via annotation",
            Self::InUse => "youngest resource is below max age",
        };
        f.write_str(reason)
    }
}

/// Where the max age for a namespace came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdSource {
    /// Per-namespace TTL annotation
    Annotation,
    /// Hash-based (build/test) namespace default
    HashBased,
    /// Named review namespace default
    Review,
}

impl fmt::Display for ThresholdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Annotation => "annotation",
            Self::HashBased => "hash-based",
            Self::Review => "review",
        })
    }
}

/// Max age that applies to a namespace and its origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub max_age: ResourceAge,
    pub source: ThresholdSource,
}

/// Result of the name, status and annotation rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screening {
    /// Kept without looking at resource ages
    Keep(KeepReason),
    /// Deletion candidate once its youngest resource reaches the threshold
    Candidate(Threshold),
}

/// Outcome of evaluating one namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Keep {
        reason: KeepReason,
        /// Present once the age comparison was reached
        age: Option<ResourceAge>,
        threshold: Option<Threshold>,
    },
    Delete {
        age: ResourceAge,
        threshold: Threshold,
    },
}

impl Decision {
    const fn keep(reason: KeepReason) -> Self {
        Self::Keep {
            reason,
            age: None,
            threshold: None,
        }
    }

    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// Keep/delete rules for CI namespaces, built from the collector config
#[derive(Debug, Clone)]
pub struct RetentionPolicy<'a> {
    protected_branches: &'a [String],
    opt_out_annotations: &'a [String],
    ttl_annotation: &'a str,
    max_review_age: ResourceAge,
    max_build_age: ResourceAge,
    age_sources: &'a [ResourceKind],
}

impl<'a> RetentionPolicy<'a> {
    #[must_use]
    pub fn new(config: &'a GcConfig) -> Self {
        Self {
            protected_branches: &config.protected_branches,
            opt_out_annotations: &config.opt_out_annotations,
            ttl_annotation: &config.ttl_annotation,
            max_review_age: config.max_review_namespace_age,
            max_build_age: config.max_build_namespace_age,
            age_sources: &config.age_sources,
        }
    }

    /// Apply the name, status and annotation rules in order.
    pub fn screen(&self, namespace: &Namespace) -> Result<Screening> {
        let name = namespace.name_any();

        if classify::is_terminating(namespace) {
            return Ok(Screening::Keep(KeepReason::Terminating));
        }

        if classify::is_protected(&name, self.protected_branches) {
            return Ok(Screening::Keep(KeepReason::Protected));
        }

        if !classify::is_ci(&name) {
            return Ok(Screening::Keep(KeepReason::NotCi));
        }

        if classify::has_opted_out(&namespace.metadata, self.opt_out_annotations) {
            return Ok(Screening::Keep(KeepReason::OptedOut));
        }

        self.threshold(namespace, &name).map(Screening::Candidate)
    }

    fn threshold(&self, namespace: &Namespace, name: &str) -> Result<Threshold> {
        if let Some(max_age) = classify::ttl_override(&namespace.metadata, self.ttl_annotation)? {
            return Ok(Threshold {
                max_age,
                source: ThresholdSource::Annotation,
            });
        }

        Ok(if classify::is_hash_based(name) {
            Threshold {
                max_age: self.max_build_age,
                source: ThresholdSource::HashBased,
            }
        } else {
            Threshold {
                max_age: self.max_review_age,
                source: ThresholdSource::Review,
            }
        })
    }

    /// Decide whether a namespace should be deleted.
    pub async fn evaluate(
        &self,
        api: &dyn ClusterApi,
        namespace: &Namespace,
        now: DateTime<Utc>,
    ) -> Result<Decision> {
        let threshold = match self.screen(namespace)? {
            Screening::Candidate(threshold) => threshold,
            Screening::Keep(reason) => return Ok(Decision::keep(reason)),
        };

        let age = youngest_age(self.age_sources, api, namespace, now)
            .await?
            .ok_or_else(|| GcError::NoResourceAges {
                namespace: namespace.name_any(),
            })?;

        if age < threshold.max_age {
            return Ok(Decision::Keep {
                reason: KeepReason::InUse,
                age: Some(age),
                threshold: Some(threshold),
            });
        }

        Ok(Decision::Delete { age, threshold })
    }
}
