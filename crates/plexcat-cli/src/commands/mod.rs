pub mod actions;
pub mod clear;
pub mod daemon;
pub mod status;
pub mod sync;
pub mod sync_ui;

use chrono::{DateTime, Utc};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use library_sync_config::{Config, CredentialStore, PathManager, TOKEN_ENV_VAR};
use library_sync_core::{CatalogEngine, EngineBuilder, JsonSnapshotStore};
use library_sync_sources::PlexSource;
use std::path::Path;
use std::sync::Arc;

pub fn load_config(paths: &PathManager) -> Result<Config> {
    let config_file = paths.config_file();
    if !config_file.exists() {
        return Err(eyre!(
            "Configuration file not found at {}. Create it with at least:\n\n[server]\nurl = \"http://localhost:32400\"",
            config_file.display()
        ));
    }
    let config = Config::load_from_file(&config_file)
        .map_err(|e| eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    config
        .validate()
        .map_err(|e| eyre!("Invalid configuration in {}: {}", config_file.display(), e))?;
    Ok(config)
}

/// Wire the Plex source and the snapshot file into an engine builder.
pub fn engine_builder(config: &Config, paths: &PathManager) -> Result<EngineBuilder> {
    let credentials_file = paths.credentials_file();
    let mut cred_store = CredentialStore::new(credentials_file.clone());
    cred_store
        .load()
        .map_err(|e| eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;
    let token = cred_store.resolve_plex_token().ok_or_else(|| {
        eyre!(
            "No Plex token found. Set {} or add plex_token to {}",
            TOKEN_ENV_VAR,
            credentials_file.display()
        )
    })?;

    let source = PlexSource::from_config(&config.server, &token)
        .map_err(|e| eyre!("Failed to create Plex source: {}", e))?;
    let store = JsonSnapshotStore::from_config(&config.snapshot, paths);
    tracing::debug!(
        server = %source.server_url(),
        snapshot = %store.path().display(),
        "Building catalog engine"
    );

    Ok(CatalogEngine::builder(Arc::new(source), Arc::new(store)).with_sync_options(&config.sync))
}

/// Remember when the last complete pass finished. Failures only warn.
pub fn record_pass_completion(credentials_file: &Path, at: DateTime<Utc>) {
    let mut store = CredentialStore::new(credentials_file.to_path_buf());
    let result = store.load().and_then(|()| {
        store.set_last_pass_completed(at);
        store.save()
    });
    if let Err(e) = result {
        tracing::warn!(error = %e, "Failed to record pass completion time");
    }
}

pub fn last_pass_completed(credentials_file: &Path) -> Option<DateTime<Utc>> {
    let mut store = CredentialStore::new(credentials_file.to_path_buf());
    store.load().ok()?;
    store.get_last_pass_completed()
}
