//! Pod create options.
//!
//! Options are applied in order to a fresh [`PodConfig`]; the first failing
//! option aborts pod creation before anything is persisted.

use std::collections::BTreeMap;

use corral_common::names::is_valid_name;
use corral_common::{CorralError, CorralResult};

use super::PodConfig;

/// A configuration mutator applied during pod creation.
pub type PodCreateOption = Box<dyn FnOnce(&mut PodConfig) -> CorralResult<()> + Send>;

/// Set the pod name.
pub fn with_name(name: impl Into<String>) -> PodCreateOption {
    let name = name.into();
    Box::new(move |config| {
        if !is_valid_name(&name) {
            return Err(CorralError::invalid_argument(format!(
                "pod name {name:?} must match [a-zA-Z0-9][a-zA-Z0-9_.-]*"
            )));
        }
        config.name = name;
        Ok(())
    })
}

/// Set the cgroup parent of the pod.
pub fn with_cgroup_parent(parent: impl Into<String>) -> PodCreateOption {
    let parent = parent.into();
    Box::new(move |config| {
        if parent.is_empty() {
            return Err(CorralError::invalid_argument(
                "cgroup parent must not be empty",
            ));
        }
        config.cgroup_parent = parent;
        Ok(())
    })
}

/// Give the pod its own cgroup, shared by all of its containers.
pub fn with_pod_cgroup() -> PodCreateOption {
    Box::new(|config| {
        config.use_pod_cgroup = true;
        Ok(())
    })
}

/// Add labels to the pod.
pub fn with_labels<I, K, V>(labels: I) -> PodCreateOption
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let labels: BTreeMap<String, String> = labels
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    Box::new(move |config| {
        config.labels.extend(labels);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(options: Vec<PodCreateOption>) -> CorralResult<PodConfig> {
        let mut config = PodConfig::default();
        for option in options {
            option(&mut config)?;
        }
        Ok(config)
    }

    #[test]
    fn options_apply_in_order() {
        let config = apply(vec![
            with_name("first"),
            with_name("second"),
            with_pod_cgroup(),
            with_labels([("tier", "web")]),
        ])
        .unwrap();

        assert_eq!(config.name, "second");
        assert!(config.use_pod_cgroup);
        assert_eq!(config.labels.get("tier").map(String::as_str), Some("web"));
    }

    #[test]
    fn invalid_name_rejected() {
        let err = apply(vec![with_name("bad name")]).unwrap_err();
        assert!(matches!(err, CorralError::InvalidArgument { .. }));
    }

    #[test]
    fn empty_cgroup_parent_rejected() {
        assert!(apply(vec![with_cgroup_parent("")]).is_err());
        let config = apply(vec![with_cgroup_parent("/custom")]).unwrap();
        assert_eq!(config.cgroup_parent, "/custom");
    }
}
