//! Pod filters for [`Runtime::pods`](crate::runtime::Runtime::pods).
//!
//! A filter is any `Fn(&Pod) -> bool`. A pod is listed only when every
//! filter accepts it.

use corral_common::{CorralError, CorralResult};
use regex::Regex;

use super::Pod;

/// A predicate over pods.
pub type PodFilter<'a> = &'a dyn Fn(&Pod) -> bool;

/// Accept pods whose name matches `pattern`.
pub fn name_matches(pattern: &str) -> CorralResult<impl Fn(&Pod) -> bool + use<>> {
    let re = Regex::new(pattern)
        .map_err(|e| CorralError::invalid_argument(format!("invalid pod name filter {pattern:?}: {e}")))?;
    Ok(move |pod: &Pod| re.is_match(pod.name()))
}

/// Accept pods whose ID starts with `prefix`.
pub fn id_prefix(prefix: impl Into<String>) -> impl Fn(&Pod) -> bool {
    let prefix = prefix.into();
    move |pod: &Pod| pod.id().as_str().starts_with(&prefix)
}

/// Accept pods carrying `key=value`.
pub fn label(key: impl Into<String>, value: impl Into<String>) -> impl Fn(&Pod) -> bool {
    let (key, value) = (key.into(), value.into());
    move |pod: &Pod| pod.label(&key) == Some(value.as_str())
}

/// Accept pods that own a cgroup.
pub fn uses_pod_cgroup() -> impl Fn(&Pod) -> bool {
    |pod: &Pod| pod.config().use_pod_cgroup
}
