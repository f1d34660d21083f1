pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{Config, SchedulerConfig, ServerConfig, SnapshotConfig, SyncOptions, default_scheduler_config};
pub use credentials::{CredentialStore, TOKEN_ENV_VAR};
pub use paths::{base_path_override, PathManager, BASE_PATH_ENV_VAR};
