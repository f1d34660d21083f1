use anyhow::Result;
use std::path::{Path, PathBuf};

/// Overrides every plexcat directory with one base directory (containers).
pub const BASE_PATH_ENV_VAR: &str = "PLEXCAT_BASE_PATH";

const APP_DIR: &str = "plexcat";

/// Base directory from `PLEXCAT_BASE_PATH`, if set.
pub fn base_path_override() -> Option<PathBuf> {
    std::env::var_os(BASE_PATH_ENV_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Where plexcat keeps its configuration, snapshot and logs.
#[derive(Debug, Clone)]
pub struct PathManager {
    config_dir: PathBuf,
    data_dir: PathBuf,
    log_dir: PathBuf,
}

impl PathManager {
    /// Platform directories: config under the user config dir, the snapshot
    /// and logs under the user data dir.
    pub fn platform() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join(APP_DIR);
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
            .join(APP_DIR);
        Ok(Self {
            config_dir,
            log_dir: data_dir.join("logs"),
            data_dir,
        })
    }

    /// Layout rooted at an arbitrary directory (containers, tests).
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            config_dir: base.clone(),
            data_dir: base.join("data"),
            log_dir: base.join("logs"),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Default location of the persisted catalog tree
    pub fn snapshot_file(&self, compressed: bool) -> PathBuf {
        let name = if compressed { "library.json.gz" } else { "library.json" };
        self.cache_dir().join(name)
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.config_dir.join("credentials.toml")
    }

    pub fn daemon_log_file(&self) -> PathBuf {
        self.log_dir.join("plexcat.log")
    }
}

impl Default for PathManager {
    fn default() -> Self {
        if let Some(base) = base_path_override() {
            return Self::with_base(base);
        }
        match Self::platform() {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(error = %e, "No platform directories, using ./plexcat");
                Self::with_base(PathBuf::from(APP_DIR))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_base() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::with_base(dir.path().to_path_buf());

        assert_eq!(paths.config_file(), dir.path().join("config.toml"));
        assert_eq!(paths.credentials_file(), dir.path().join("credentials.toml"));
        assert_eq!(paths.snapshot_file(false), dir.path().join("data/cache/library.json"));
        assert_eq!(paths.snapshot_file(true), dir.path().join("data/cache/library.json.gz"));
        assert_eq!(paths.daemon_log_file(), dir.path().join("logs/plexcat.log"));
    }

    #[test]
    fn test_platform_dirs_are_app_scoped() {
        if let Ok(paths) = PathManager::platform() {
            assert!(paths.config_dir().ends_with(APP_DIR));
            assert!(paths.data_dir().ends_with(APP_DIR));
            assert!(paths.log_dir().starts_with(paths.data_dir()));
        }
    }
}
