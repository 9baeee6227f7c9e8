//! Runtime configuration.

use std::path::{Path, PathBuf};

use corral_common::{CorralError, CorralPaths, CorralResult};
use serde::Deserialize;

use crate::cgroup::{CGROUP_ROOT, CgroupManager, CgroupParents, CgroupVersion};
use crate::container::DEFAULT_STOP_TIMEOUT;

/// Runtime configuration options.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Paths for runtime data.
    pub paths: CorralPaths,
    /// Which cgroup manager pod cgroups are validated against.
    pub cgroup_manager: CgroupManager,
    /// Default pod cgroup parent for each manager.
    pub cgroup_parents: CgroupParents,
    /// Cgroup hierarchy layout.
    pub cgroup_version: CgroupVersion,
    /// Mount point of the cgroup hierarchy.
    pub cgroup_root: PathBuf,
    /// Stop timeout (seconds) for containers that do not set one.
    pub stop_timeout: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            paths: CorralPaths::new(),
            cgroup_manager: CgroupManager::default(),
            cgroup_parents: CgroupParents::default(),
            cgroup_version: CgroupVersion::detect(),
            cgroup_root: PathBuf::from(CGROUP_ROOT),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// On-disk form of [`RuntimeConfig`]. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    root: Option<PathBuf>,
    runtime_dir: Option<PathBuf>,
    rootless: Option<bool>,
    cgroup_manager: Option<CgroupManager>,
    cgroup_parents: Option<CgroupParents>,
    cgroup_version: Option<CgroupVersion>,
    cgroup_root: Option<PathBuf>,
    stop_timeout: Option<u32>,
}

impl RuntimeConfig {
    /// Defaults for an unprivileged user: data under the home directory,
    /// cgroups delegated through systemd.
    #[must_use]
    pub fn rootless() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        let root = home.join(".local/share/corral");

        Self {
            paths: CorralPaths::with_root(root),
            cgroup_manager: CgroupManager::Systemd,
            ..Self::default()
        }
    }

    /// Parse a TOML configuration. Missing keys keep their defaults, which
    /// are those of [`RuntimeConfig::rootless`] when `rootless = true`.
    ///
    /// ```toml
    /// root = "/var/lib/corral"
    /// cgroup_manager = "systemd"
    /// stop_timeout = 30
    ///
    /// [cgroup_parents]
    /// systemd = "corral.slice"
    /// ```
    pub fn from_toml_str(input: &str) -> CorralResult<Self> {
        let file: ConfigFile = toml::from_str(input).map_err(|e| CorralError::Config {
            message: e.to_string(),
        })?;
        let base = if file.rootless.unwrap_or(false) {
            Self::rootless()
        } else {
            Self::default()
        };
        Ok(base.merge(file))
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> CorralResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| CorralError::Config {
            message: format!("error reading {}: {e}", path.display()),
        })?;
        let config = Self::from_toml_str(&input).map_err(|e| match e {
            CorralError::Config { message } => CorralError::Config {
                message: format!("{}: {message}", path.display()),
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "Loaded runtime configuration");
        Ok(config)
    }

    fn merge(mut self, file: ConfigFile) -> Self {
        if let Some(root) = file.root {
            self = self.with_root(root);
        }
        if let Some(runtime_dir) = file.runtime_dir {
            self.paths.runtime = runtime_dir;
        }
        if let Some(manager) = file.cgroup_manager {
            self.cgroup_manager = manager;
        }
        if let Some(parents) = file.cgroup_parents {
            self.cgroup_parents = parents;
        }
        match (file.cgroup_root, file.cgroup_version) {
            (Some(root), None) => self = self.with_cgroup_root(root),
            (root, version) => {
                if let Some(root) = root {
                    self.cgroup_root = root;
                }
                if let Some(version) = version {
                    self.cgroup_version = version;
                }
            }
        }
        if let Some(timeout) = file.stop_timeout {
            self.stop_timeout = timeout;
        }
        self
    }

    /// Set the root directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths = CorralPaths::with_root(root);
        self
    }

    /// Set the cgroup manager.
    #[must_use]
    pub const fn with_cgroup_manager(mut self, manager: CgroupManager) -> Self {
        self.cgroup_manager = manager;
        self
    }

    /// Set the cgroup hierarchy version.
    #[must_use]
    pub const fn with_cgroup_version(mut self, version: CgroupVersion) -> Self {
        self.cgroup_version = version;
        self
    }

    /// Use a different cgroup mount point, re-detecting its version.
    #[must_use]
    pub fn with_cgroup_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cgroup_root = root.into();
        self.cgroup_version = CgroupVersion::detect_at(&self.cgroup_root);
        self
    }

    /// Set the default stop timeout in seconds.
    #[must_use]
    pub const fn with_stop_timeout(mut self, seconds: u32) -> Self {
        self.stop_timeout = seconds;
        self
    }
}
