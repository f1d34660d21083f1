use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncOptions,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the media server, e.g. "http://192.168.1.10:32400"
    pub url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Library synchronization behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Fixed ceiling on concurrently outstanding fetches against the server
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    /// Tolerance applied when evicting whole collections
    #[serde(default = "default_collection_grace_secs")]
    pub collection_grace_secs: u64,
    #[serde(default = "default_true")]
    pub fetch_movie_details: bool,
    #[serde(default)]
    pub fetch_episode_details: bool,
    /// Save the snapshot at the end of every pass, not only on shutdown
    #[serde(default = "default_true")]
    pub persist_after_pass: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            collection_grace_secs: default_collection_grace_secs(),
            fetch_movie_details: true,
            fetch_episode_details: false,
            persist_after_pass: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Overrides the default snapshot location under the data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub compress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cron expression with a leading seconds field
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_concurrent_fetches() -> usize {
    3
}

fn default_collection_grace_secs() -> u64 {
    60
}

fn default_schedule() -> String {
    "0 0 */6 * * *".to_string()  // Every 6 hours
}

pub fn default_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        schedule: default_schedule(),
        run_on_startup: default_true(),
    }
}

impl Config {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server: ServerConfig {
                url: server_url.into(),
                request_timeout_secs: default_request_timeout_secs(),
            },
            sync: SyncOptions::default(),
            snapshot: SnapshotConfig::default(),
            scheduler: None,
        }
    }

    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let url = self.server.url.trim();
        if url.is_empty() {
            anyhow::bail!("server.url is required");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("server.url must start with http:// or https:// (got '{}')", url);
        }
        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("server.request_timeout_secs must be greater than zero");
        }
        if self.sync.max_concurrent_fetches == 0 {
            anyhow::bail!("sync.max_concurrent_fetches must be at least 1");
        }
        Ok(())
    }

    pub fn scheduler_or_default(&self) -> SchedulerConfig {
        self.scheduler.clone().unwrap_or_else(default_scheduler_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_load_and_save() {
        let file = NamedTempFile::new().unwrap();
        let mut config = Config::new("http://127.0.0.1:32400");
        config.sync.max_concurrent_fetches = 5;
        config.snapshot.compress = true;

        let path = file.path().to_path_buf();
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.server.url, "http://127.0.0.1:32400");
        assert_eq!(loaded.sync.max_concurrent_fetches, 5);
        assert!(loaded.snapshot.compress);
        assert!(loaded.scheduler.is_none());
    }

    #[test]
    fn test_minimal_file_gets_defaults() {
        let config: Config = toml::from_str("[server]\nurl = \"http://plex.local:32400\"\n").unwrap();
        assert_eq!(config.server.request_timeout_secs, 10);
        assert_eq!(config.sync.max_concurrent_fetches, 3);
        assert_eq!(config.sync.collection_grace_secs, 60);
        assert!(config.sync.fetch_movie_details);
        assert!(!config.sync.fetch_episode_details);
        assert!(config.sync.persist_after_pass);
        assert_eq!(config.scheduler_or_default().schedule, "0 0 */6 * * *");
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config::new("");
        assert!(config.validate().is_err());

        config.server.url = "plex.local:32400".to_string();
        assert!(config.validate().is_err());

        config.server.url = "http://plex.local:32400".to_string();
        assert!(config.validate().is_ok());

        config.sync.max_concurrent_fetches = 0;
        assert!(config.validate().is_err());
    }
}
