use super::load_config;
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use library_sync_config::{PathManager, SnapshotConfig};
use library_sync_core::JsonSnapshotStore;
use std::fs;

pub async fn run_clear(all: bool, credentials: bool, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();

    // Plain `clear` drops the snapshot only
    if all || !credentials {
        clear_snapshot(&path_manager, output)?;
    }
    if all || credentials {
        clear_credentials(&path_manager, output)?;
    }
    if all {
        output.success("Snapshot and credentials cleared");
    }
    Ok(())
}

fn clear_snapshot(path_manager: &PathManager, output: &Output) -> Result<()> {
    let snapshot_config = load_config(path_manager)
        .map(|c| c.snapshot)
        .unwrap_or_else(|_| SnapshotConfig::default());
    let store = JsonSnapshotStore::from_config(&snapshot_config, path_manager);

    let removed = store
        .clear()
        .map_err(|e| eyre!("Failed to clear snapshot: {:#}", e))?;
    if removed {
        tracing::info!(operation = "clear", path = %store.path().display(), "Snapshot removed");
        output.success(format!("Cleared snapshot: {}", store.path().display()));
    } else {
        output.info("No snapshot found to clear");
    }

    let backup = store.path().with_extension("bak");
    if backup.exists() {
        fs::remove_file(&backup)
            .map_err(|e| eyre!("Failed to remove snapshot backup at {}: {}", backup.display(), e))?;
        output.success(format!("Cleared snapshot backup: {}", backup.display()));
    }
    Ok(())
}

fn clear_credentials(path_manager: &PathManager, output: &Output) -> Result<()> {
    let credentials_file = path_manager.credentials_file();

    if credentials_file.exists() {
        fs::remove_file(&credentials_file).map_err(|e| {
            eyre!(
                "Failed to remove credentials file at {}: {}",
                credentials_file.display(),
                e
            )
        })?;
        output.success(format!("Cleared credentials: {}", credentials_file.display()));
    } else {
        output.info("No credentials file found to clear");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;

    #[test]
    fn test_clear_removes_snapshot_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::with_base(dir.path().to_path_buf());
        let output = Output::new(OutputFormat::Human, true);
        let store = JsonSnapshotStore::from_config(&SnapshotConfig::default(), &paths);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{}").unwrap();
        fs::write(store.path().with_extension("bak"), "garbage").unwrap();

        clear_snapshot(&paths, &output).unwrap();
        assert!(!store.path().exists());
        assert!(!store.path().with_extension("bak").exists());

        // Nothing left is not an error
        clear_snapshot(&paths, &output).unwrap();
    }

    #[test]
    fn test_clear_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::with_base(dir.path().to_path_buf());
        let output = Output::new(OutputFormat::Human, true);
        let file = paths.credentials_file();
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, "plex_token = \"abc\"\n").unwrap();

        clear_credentials(&paths, &output).unwrap();
        assert!(!file.exists());
    }
}
