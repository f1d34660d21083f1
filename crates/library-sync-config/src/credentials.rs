use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that takes precedence over the stored token.
pub const TOKEN_ENV_VAR: &str = "PLEXCAT_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    plex_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_pass_completed: Option<DateTime<Utc>>,
}

/// `credentials.toml`: the server token plus bookkeeping that should not live
/// in `config.toml`.
pub struct CredentialStore {
    path: PathBuf,
    credentials: Credentials,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            credentials: Credentials::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file leaves the store empty.
    pub fn load(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        self.credentials = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&self.credentials)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn plex_token(&self) -> Option<&str> {
        self.credentials.plex_token.as_deref()
    }

    pub fn set_plex_token(&mut self, token: impl Into<String>) {
        self.credentials.plex_token = Some(token.into());
    }

    /// Token to send to the server: `PLEXCAT_TOKEN` first, then the stored one.
    pub fn resolve_plex_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.plex_token().map(str::to_string))
    }

    pub fn get_last_pass_completed(&self) -> Option<DateTime<Utc>> {
        self.credentials.last_pass_completed
    }

    pub fn set_last_pass_completed(&mut self, at: DateTime<Utc>) {
        self.credentials.last_pass_completed = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.toml");

        let mut store = CredentialStore::new(path.clone());
        store.set_plex_token("abc123");
        store.save().unwrap();

        let mut loaded = CredentialStore::new(path);
        loaded.load().unwrap();
        assert_eq!(loaded.plex_token(), Some("abc123"));
        assert!(loaded.get_last_pass_completed().is_none());
    }

    #[test]
    fn test_pass_time_does_not_drop_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        std::fs::write(&path, "plex_token = \"xyz\"\n").unwrap();

        let mut store = CredentialStore::new(path.clone());
        store.load().unwrap();
        let at = Utc::now();
        store.set_last_pass_completed(at);
        store.save().unwrap();

        let mut loaded = CredentialStore::new(path);
        loaded.load().unwrap();
        assert_eq!(loaded.plex_token(), Some("xyz"));
        assert_eq!(loaded.get_last_pass_completed(), Some(at));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CredentialStore::new(dir.path().join("absent.toml"));
        store.load().unwrap();
        assert!(store.plex_token().is_none());
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.toml");
        std::fs::write(&path, "plex_token = [").unwrap();
        let mut store = CredentialStore::new(path);
        assert!(store.load().is_err());
    }
}
