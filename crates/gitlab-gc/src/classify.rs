//! Name and annotation predicates used by the retention policy.
//!
//! Everything here is pure: the functions only look at a namespace's name,
//! annotations and status phase, never at the cluster.

use std::sync::OnceLock;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use regex::Regex;

use crate::age::ResourceAge;
use crate::error::{GcError, Result};

/// Tag marking a namespace as created by a CI pipeline
pub const CI_TAG: &str = "ci";

/// Tag carried by GitLab executor pod names (legacy matching rule)
pub const PROJECT_TAG: &str = "project";

/// Status phase of a namespace that is being torn down
pub const PHASE_TERMINATING: &str = "Terminating";

/// Value an opt-out annotation must carry to protect a namespace
const OPT_OUT_VALUE: &str = "true";

/// Machine-generated review ids end in a long hex run (commit or pipeline hash)
static HASH_SUFFIX_REGEX: OnceLock<Regex> = OnceLock::new();

/// Static regex for one `<number><unit>` component of a TTL duration
static TTL_COMPONENT_REGEX: OnceLock<Regex> = OnceLock::new();

/// Returns true if `tag` appears in `name` as a `-` delimited segment.
///
/// `ci-review`, `review-ci` and `app-ci-review` are tagged by `ci`;
/// `circle` and `civic-app` are not.
#[must_use]
pub fn is_tagged_by(name: &str, tag: &str) -> bool {
    name.starts_with(&format!("{tag}-"))
        || name.ends_with(&format!("-{tag}"))
        || name.contains(&format!("-{tag}-"))
}

/// Returns true if the name carries any of the protected branch tokens.
#[must_use]
pub fn is_protected(name: &str, protected_branches: &[String]) -> bool {
    protected_branches
        .iter()
        .filter(|branch| !branch.is_empty())
        .any(|branch| is_tagged_by(name, branch))
}

/// Returns true if the name is tagged as a CI namespace.
#[must_use]
pub fn is_ci(name: &str) -> bool {
    is_tagged_by(name, CI_TAG)
}

/// Returns true if the name ends in at least 15 hex characters.
#[must_use]
pub fn is_hash_based(name: &str) -> bool {
    let regex = HASH_SUFFIX_REGEX
        .get_or_init(|| Regex::new(r"[0-9a-fA-F]{15,}$").expect("Invalid regex pattern"));
    regex.is_match(name)
}

/// Returns true if any configured opt-out annotation is set to exactly `"true"`.
#[must_use]
pub fn has_opted_out(meta: &ObjectMeta, opt_out_annotations: &[String]) -> bool {
    let Some(annotations) = meta.annotations.as_ref() else {
        return false;
    };

    opt_out_annotations
        .iter()
        .any(|key| annotations.get(key).is_some_and(|value| value == OPT_OUT_VALUE))
}

/// Returns true if the namespace is already being deleted.
#[must_use]
pub fn is_terminating(namespace: &Namespace) -> bool {
    namespace
        .status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some(PHASE_TERMINATING)
}

/// Returns true if the pod labels mark it as a GitLab CI job pod.
#[must_use]
pub fn is_gitlab_job_pod(meta: &ObjectMeta) -> bool {
    meta.labels
        .as_ref()
        .and_then(|labels| labels.get("app"))
        .is_some_and(|app| app == "gitlab-ci-job")
}

/// Extracts the TTL override from the namespace annotations.
///
/// Returns `Ok(None)` if the annotation is absent and an error if it is
/// present but malformed.
pub fn ttl_override(meta: &ObjectMeta, ttl_annotation: &str) -> Result<Option<ResourceAge>> {
    let Some(raw) = meta
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(ttl_annotation))
    else {
        return Ok(None);
    };

    parse_ttl(raw)
        .map(Some)
        .map_err(|reason| GcError::InvalidTtl {
            namespace: meta.name.clone().unwrap_or_default(),
            value: raw.clone(),
            reason,
        })
}

/// Parse a TTL like "3600", "90s", "30m", "6h", "2d" or "1h30m".
///
/// A bare number is read as seconds.
pub fn parse_ttl(raw: &str) -> std::result::Result<ResourceAge, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = s
            .parse()
            .map_err(|e| format!("invalid seconds value: {e}"))?;
        return Ok(ResourceAge::from_secs(secs));
    }

    let regex = TTL_COMPONENT_REGEX
        .get_or_init(|| Regex::new(r"(\d+)([a-zA-Z]+)").expect("Invalid regex pattern"));

    let mut total: i64 = 0;
    let mut consumed = 0;
    for caps in regex.captures_iter(s) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() != consumed {
            return Err(format!("unexpected input at {:?}", &s[consumed..whole.start()]));
        }
        consumed = whole.end();

        let value: i64 = caps[1]
            .parse()
            .map_err(|e| format!("invalid number {:?}: {e}", &caps[1]))?;
        let unit: i64 = match &caps[2] {
            "s" => 1,
            "m" => 60,
            "h" => 60 * 60,
            "d" => 60 * 60 * 24,
            other => return Err(format!("unknown unit {other:?}, expected one of d, h, m, s")),
        };

        total = value
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| "duration overflows".to_string())?;
    }

    if consumed != s.len() {
        return Err(format!("unexpected input at {:?}", &s[consumed..]));
    }

    Ok(ResourceAge::from_secs(total))
}
