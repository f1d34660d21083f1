use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use library_sync_config::{PathManager, SnapshotConfig};
use library_sync_models::CatalogRoot;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

const SNAPSHOT_VERSION: u32 = 1;

/// Persistence for the whole catalog tree.
///
/// A missing snapshot is not an error: `load` returns an empty tree.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<CatalogRoot>;
    fn save(&self, root: &CatalogRoot) -> Result<()>;
    /// Where the snapshot lives, for log messages.
    fn location(&self) -> String;
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    saved_at: DateTime<Utc>,
    root: CatalogRoot,
}

/// JSON snapshot on disk, optionally gzip-compressed.
pub struct JsonSnapshotStore {
    path: PathBuf,
    use_compression: bool,
}

impl JsonSnapshotStore {
    pub fn new(path: PathBuf, use_compression: bool) -> Self {
        Self { path, use_compression }
    }

    pub fn from_config(config: &SnapshotConfig, paths: &PathManager) -> Self {
        let path = config
            .path
            .clone()
            .unwrap_or_else(|| paths.snapshot_file(config.compress));
        Self::new(path, config.compress)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Delete the snapshot. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove snapshot {:?}", self.path))?;
        Ok(true)
    }

    fn backup_corrupt_file(&self, reason: &str) {
        let backup_path = self.path.with_extension("bak");
        match std::fs::rename(&self.path, &backup_path) {
            Ok(()) => warn!(
                "Snapshot at {:?} is unreadable ({}). Moved it to {:?} and starting with an empty catalog.",
                self.path, reason, backup_path
            ),
            Err(e) => warn!(
                "Snapshot at {:?} is unreadable ({}) and could not be backed up: {}. Starting with an empty catalog.",
                self.path, reason, e
            ),
        }
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load(&self) -> Result<CatalogRoot> {
        if !self.path.exists() {
            debug!("Snapshot {:?} does not exist, starting with an empty catalog", self.path);
            return Ok(CatalogRoot::new());
        }

        let start = std::time::Instant::now();
        let data = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read snapshot {:?}", self.path))?;

        let decoded = if self.use_compression {
            let mut decoder = GzDecoder::new(&data[..]);
            let mut decompressed = Vec::new();
            if let Err(e) = decoder.read_to_end(&mut decompressed) {
                self.backup_corrupt_file(&e.to_string());
                return Ok(CatalogRoot::new());
            }
            decompressed
        } else {
            data
        };

        let file: SnapshotFile = match serde_json::from_slice(&decoded) {
            Ok(file) => file,
            Err(e) => {
                self.backup_corrupt_file(&e.to_string());
                return Ok(CatalogRoot::new());
            }
        };
        if file.version != SNAPSHOT_VERSION {
            self.backup_corrupt_file(&format!("unsupported version {}", file.version));
            return Ok(CatalogRoot::new());
        }

        let counts = file.root.counts();
        info!(
            "Loaded snapshot saved at {}: {} collections, {} shows, {} episodes, {} movies in {:?}",
            file.saved_at.to_rfc3339(),
            counts.collections,
            counts.shows,
            counts.episodes,
            counts.movies,
            start.elapsed()
        );
        Ok(file.root)
    }

    fn save(&self, root: &CatalogRoot) -> Result<()> {
        let start = std::time::Instant::now();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = SnapshotFile {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            root: root.clone(),
        };
        let serialized = serde_json::to_vec(&file)?;

        let encoded = if self.use_compression {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&serialized)?;
            encoder.finish()?
        } else {
            serialized
        };

        // Write next to the target and rename so a crash never leaves a torn file
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, &encoded)
            .with_context(|| format!("Failed to write snapshot {:?}", tmp_path))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to move snapshot into place at {:?}", self.path))?;

        debug!(
            "Saved snapshot to {:?} ({} bytes) in {:?}",
            self.path,
            encoded.len(),
            start.elapsed()
        );
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory store, for tests and one-shot runs that should not touch disk.
#[derive(Default)]
pub struct MemorySnapshotStore {
    root: Mutex<Option<CatalogRoot>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: CatalogRoot) -> Self {
        Self {
            root: Mutex::new(Some(root)),
            ..Self::default()
        }
    }

    /// The last saved (or seeded) tree.
    pub fn stored(&self) -> Option<CatalogRoot> {
        self.root.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<CatalogRoot> {
        Ok(self.stored().unwrap_or_default())
    }

    fn save(&self, root: &CatalogRoot) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("memory store configured to fail");
        }
        let mut guard = self
            .root
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        *guard = Some(root.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
