//! Standard filesystem paths for Corral.

use std::path::PathBuf;

use once_cell::sync::Lazy;

/// Default root directory for Corral data.
pub static CORRAL_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("CORRAL_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/corral"))
});

/// Default runtime directory for Corral.
pub static CORRAL_RUNTIME_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("CORRAL_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/run/corral"))
});

/// Standard paths used by the Corral runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorralPaths {
    /// Root data directory (default: /var/lib/corral).
    pub root: PathBuf,
    /// Runtime directory (default: /run/corral).
    pub runtime: PathBuf,
}

impl CorralPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let runtime = root.join("run");
        Self { root, runtime }
    }

    /// Directory holding persisted pod and container records.
    #[must_use]
    pub fn records(&self) -> PathBuf {
        self.root.join("state")
    }

    /// Directory for container data.
    #[must_use]
    pub fn containers(&self) -> PathBuf {
        self.root.join("containers")
    }

    /// Directory for a specific container.
    #[must_use]
    pub fn container(&self, id: &str) -> PathBuf {
        self.containers().join(id)
    }

    /// Dedicated storage (root filesystem) of a container.
    #[must_use]
    pub fn container_storage(&self, id: &str) -> PathBuf {
        self.container(id).join("rootfs")
    }

    /// Per-boot runtime directory of a container (mounts, sockets, pid file).
    #[must_use]
    pub fn container_run(&self, id: &str) -> PathBuf {
        self.runtime.join("containers").join(id)
    }

    /// PID file for a container.
    #[must_use]
    pub fn container_pid(&self, id: &str) -> PathBuf {
        self.container_run(id).join("pid")
    }

    /// Directory for inter-process lock files.
    #[must_use]
    pub fn locks(&self) -> PathBuf {
        self.runtime.join("locks")
    }

    /// Lock file of a pod.
    #[must_use]
    pub fn pod_lock(&self, id: &str) -> PathBuf {
        self.locks().join("pods").join(format!("{id}.lock"))
    }

    /// Lock file of a container.
    #[must_use]
    pub fn container_lock(&self, id: &str) -> PathBuf {
        self.locks().join("containers").join(format!("{id}.lock"))
    }

    /// Create all necessary directories.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.runtime)?;
        std::fs::create_dir_all(self.records())?;
        std::fs::create_dir_all(self.containers())?;
        std::fs::create_dir_all(self.locks().join("pods"))?;
        std::fs::create_dir_all(self.locks().join("containers"))?;
        Ok(())
    }
}

impl Default for CorralPaths {
    fn default() -> Self {
        Self {
            root: CORRAL_ROOT.clone(),
            runtime: CORRAL_RUNTIME_DIR.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_root() {
        let paths = CorralPaths::with_root("/tmp/corral-test");
        assert_eq!(
            paths.containers(),
            PathBuf::from("/tmp/corral-test/containers")
        );
        assert_eq!(paths.runtime, PathBuf::from("/tmp/corral-test/run"));
        assert_eq!(
            paths.container_storage("abc"),
            PathBuf::from("/tmp/corral-test/containers/abc/rootfs")
        );
    }

    #[test]
    fn lock_paths() {
        let paths = CorralPaths::with_root("/tmp/corral-test");
        assert_eq!(
            paths.pod_lock("p1"),
            PathBuf::from("/tmp/corral-test/run/locks/pods/p1.lock")
        );
        assert_eq!(
            paths.container_lock("c1"),
            PathBuf::from("/tmp/corral-test/run/locks/containers/c1.lock")
        );
    }

    #[test]
    fn create_dirs_builds_layout() {
        let temp = std::env::temp_dir().join(format!("corral-paths-{}", std::process::id()));
        let paths = CorralPaths::with_root(&temp);
        paths.create_dirs().unwrap();
        assert!(paths.records().is_dir());
        assert!(paths.locks().join("pods").is_dir());
        std::fs::remove_dir_all(&temp).unwrap();
    }
}
