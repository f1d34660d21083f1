//! Long-lived engine owning the cached catalog.
//!
//! The engine loads the snapshot on first use, runs at most one pass at a
//! time in the background, answers lookups from the last completed pass and
//! tears everything down in a fixed order on `close`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use library_sync_config::SyncOptions;
use library_sync_models::{
    CatalogCounts, CatalogRoot, CollectionDescriptor, EpisodeEntry, MovieEntry, ShowEntry,
};
use library_sync_sources::CatalogSource;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{SyncError, TeardownError};
use crate::evict::EvictionReport;
use crate::index::{CatalogIndex, NodePath};
use crate::orchestrator::{FetchOrchestrator, PassOptions, PassOutcome};
use crate::pool::FailureHook;
use crate::snapshot::SnapshotStore;
use crate::state::{EngineState, StateReporter};

/// Something that must be shut down before the final snapshot is written,
/// such as a webhook registration or a notification listener.
#[async_trait]
pub trait Collaborator: Send + Sync {
    fn name(&self) -> &str;
    async fn shutdown(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub canceled: bool,
    pub counts: CatalogCounts,
    pub eviction: EvictionReport,
    pub failed_units: Vec<String>,
    pub skipped_units: usize,
    pub list_failures: Vec<String>,
    pub persisted: bool,
}

impl PassSummary {
    fn from_outcome(outcome: &PassOutcome, persisted: bool) -> Self {
        Self {
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
            canceled: outcome.canceled,
            counts: outcome.counts,
            eviction: outcome.eviction,
            failed_units: outcome
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.label, f.error))
                .collect(),
            skipped_units: outcome.skipped,
            list_failures: outcome.list_failures.iter().map(|e| e.to_string()).collect(),
            persisted,
        }
    }

    pub fn is_clean(&self) -> bool {
        !self.canceled && self.failed_units.is_empty() && self.list_failures.is_empty()
    }
}

/// Where an episode sits in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeLookup {
    pub show_title: String,
    pub show_rating_key: String,
    pub season: u32,
    pub episode: EpisodeEntry,
}

/// Handle to a pass running in the background.
pub struct PassHandle {
    handle: JoinHandle<Result<PassSummary, SyncError>>,
    cancel: CancellationToken,
}

impl PassHandle {
    /// Ask the pass to stop. It still evicts and persists what it has.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this pass, for signal handlers that outlive the handle.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Result<PassSummary, SyncError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(SyncError::Worker {
                label: "pass".to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

struct Catalog {
    root: CatalogRoot,
    index: CatalogIndex,
}

struct EngineInner {
    source: Arc<dyn CatalogSource>,
    orchestrator: FetchOrchestrator,
    store: Arc<dyn SnapshotStore>,
    catalog: RwLock<Catalog>,
    loaded: AtomicBool,
    state: StateReporter,
    shutdown: CancellationToken,
    pass_lock: Arc<Mutex<()>>,
    closed: AtomicBool,
    persist_after_pass: bool,
    collaborators: Vec<Arc<dyn Collaborator>>,
    last_summary: std::sync::Mutex<Option<PassSummary>>,
}

pub struct EngineBuilder {
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn SnapshotStore>,
    options: PassOptions,
    persist_after_pass: bool,
    clock: Arc<dyn Clock>,
    collaborators: Vec<Arc<dyn Collaborator>>,
    failure_hook: Option<FailureHook>,
}

impl EngineBuilder {
    pub fn with_options(mut self, options: PassOptions) -> Self {
        self.options = options;
        self
    }

    /// Take pass options and the persist flag from the config file section.
    pub fn with_sync_options(mut self, options: &SyncOptions) -> Self {
        self.options = PassOptions::from(options);
        self.persist_after_pass = options.persist_after_pass;
        self
    }

    pub fn with_persist_after_pass(mut self, persist: bool) -> Self {
        self.persist_after_pass = persist;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_collaborator(mut self, collaborator: Arc<dyn Collaborator>) -> Self {
        self.collaborators.push(collaborator);
        self
    }

    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.failure_hook = Some(hook);
        self
    }

    pub fn build(self) -> CatalogEngine {
        let state = StateReporter::new();
        let mut orchestrator = FetchOrchestrator::new(Arc::clone(&self.source), self.clock, self.options)
            .with_state_reporter(state.clone());
        if let Some(hook) = self.failure_hook {
            orchestrator = orchestrator.with_failure_hook(hook);
        }

        CatalogEngine {
            inner: Arc::new(EngineInner {
                source: self.source,
                orchestrator,
                store: self.store,
                catalog: RwLock::new(Catalog {
                    root: CatalogRoot::new(),
                    index: CatalogIndex::new(),
                }),
                loaded: AtomicBool::new(false),
                state,
                shutdown: CancellationToken::new(),
                pass_lock: Arc::new(Mutex::new(())),
                closed: AtomicBool::new(false),
                persist_after_pass: self.persist_after_pass,
                collaborators: self.collaborators,
                last_summary: std::sync::Mutex::new(None),
            }),
        }
    }
}

/// Cheap to clone; clones share the same catalog.
#[derive(Clone)]
pub struct CatalogEngine {
    inner: Arc<EngineInner>,
}

impl CatalogEngine {
    pub fn builder(source: Arc<dyn CatalogSource>, store: Arc<dyn SnapshotStore>) -> EngineBuilder {
        EngineBuilder {
            source,
            store,
            options: PassOptions::default(),
            persist_after_pass: true,
            clock: Arc::new(SystemClock),
            collaborators: Vec::new(),
            failure_hook: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.inner.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn source_name(&self) -> &str {
        self.inner.orchestrator.source_name()
    }

    pub fn snapshot_location(&self) -> String {
        self.inner.store.location()
    }

    /// Load the snapshot now instead of on the first pass. Later calls are no-ops.
    pub async fn open(&self) -> Result<CatalogCounts, SyncError> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        let _guard = self.inner.pass_lock.lock().await;
        self.inner.ensure_loaded().await?;
        Ok(self.counts().await)
    }

    /// Start a pass in the background. Fails right away if the engine is
    /// closed or another pass is still running.
    pub fn start_pass(&self) -> Result<PassHandle, SyncError> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        let guard = Arc::clone(&self.inner.pass_lock)
            .try_lock_owned()
            .map_err(|_| SyncError::PassInProgress)?;

        let cancel = self.inner.shutdown.child_token();
        let task_cancel = cancel.clone();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            inner.run_pass(task_cancel).await
        });
        Ok(PassHandle { handle, cancel })
    }

    /// Start a pass and wait for it.
    pub async fn run_pass(&self) -> Result<PassSummary, SyncError> {
        self.start_pass()?.wait().await
    }

    /// Cancel any running pass, wait for it to drain, shut down collaborators
    /// and write the final snapshot. Every step runs even if an earlier one
    /// failed; the failures come back together. Calling `close` twice is a
    /// no-op.
    pub async fn close(&self) -> Result<(), TeardownError> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!("Engine already closed");
            return Ok(());
        }
        info!(operation = "close", "Closing catalog engine");

        self.inner.shutdown.cancel();
        let _guard = self.inner.pass_lock.lock().await;

        let mut teardown = TeardownError::default();
        for collaborator in &self.inner.collaborators {
            if let Err(e) = collaborator.shutdown().await {
                warn!(
                    operation = "close",
                    component = collaborator.name(),
                    status = "error",
                    error = %e,
                    "Collaborator failed to shut down"
                );
                teardown.push(collaborator.name(), format!("{:#}", e));
            }
        }

        // Never overwrite a snapshot with a tree that was never loaded
        if self.inner.loaded.load(Ordering::SeqCst) {
            self.inner.state.set(EngineState::Persisting);
            if let Err(e) = self.inner.persist().await {
                error!(operation = "close", error = %e, "Failed to write final snapshot");
                teardown.push("snapshot", e);
            }
        } else {
            debug!("Catalog was never loaded, leaving the snapshot untouched");
        }
        self.inner.state.set(EngineState::Idle);

        if teardown.is_empty() {
            info!(operation = "close", status = "success", "Catalog engine closed");
        }
        teardown.into_result()
    }

    /// A copy of the current tree.
    pub async fn snapshot(&self) -> CatalogRoot {
        self.inner.catalog.read().await.root.clone()
    }

    pub async fn counts(&self) -> CatalogCounts {
        self.inner.catalog.read().await.root.counts()
    }

    pub fn last_summary(&self) -> Option<PassSummary> {
        self.inner.last_summary.lock().ok().and_then(|guard| guard.clone())
    }

    pub async fn find_show(&self, rating_key: &str) -> Option<ShowEntry> {
        let catalog = self.inner.catalog.read().await;
        catalog.index.find_show(&catalog.root, rating_key).cloned()
    }

    pub async fn find_episode(&self, rating_key: &str) -> Option<EpisodeLookup> {
        let catalog = self.inner.catalog.read().await;
        let (show, season, episode) = catalog.index.find_episode(&catalog.root, rating_key)?;
        Some(EpisodeLookup {
            show_title: show.title.clone(),
            show_rating_key: show.rating_key.clone(),
            season: season.number,
            episode: episode.clone(),
        })
    }

    pub async fn find_movie(&self, rating_key: &str) -> Option<MovieEntry> {
        let catalog = self.inner.catalog.read().await;
        catalog.index.find_movie(&catalog.root, rating_key).cloned()
    }

    /// Show (and episode, when the id belongs to one) carrying a TVDB id.
    pub async fn find_by_tvdb(&self, tvdb_id: u32) -> Option<(ShowEntry, Option<EpisodeEntry>)> {
        let catalog = self.inner.catalog.read().await;
        let (show, episode) = catalog.index.find_by_tvdb(&catalog.root, tvdb_id)?;
        Some((show.clone(), episode.cloned()))
    }

    /// Mark an item watched or unwatched on the server, then mirror the flag
    /// into the cached tree. Returns whether a cached node was updated.
    pub async fn set_watched(&self, rating_key: &str, watched: bool) -> Result<bool, SyncError> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        let source = &self.inner.source;
        let result = if watched {
            source.scrobble(rating_key).await
        } else {
            source.unscrobble(rating_key).await
        };
        result.map_err(|e| SyncError::from_source(rating_key, e))?;

        let mut catalog = self.inner.catalog.write().await;
        let Some(path) = catalog.index.path(rating_key).cloned() else {
            debug!(rating_key = %rating_key, "Item not cached, nothing to mirror");
            return Ok(false);
        };
        let updated = set_cached_watched(&mut catalog.root, &path, watched);
        info!(operation = "set_watched", rating_key = %rating_key, watched, node = %path, "Watched state changed");
        Ok(updated)
    }

    /// Ask the server to rescan a collection, found by title or section key.
    pub async fn scan_collection(&self, collection: &str) -> Result<CollectionDescriptor, SyncError> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        let source = &self.inner.source;
        let collections = source
            .list_collections()
            .await
            .map_err(|e| SyncError::list("collections", e))?;
        let descriptor = collections
            .into_iter()
            .find(|c| c.title == collection || c.key == collection)
            .ok_or_else(|| SyncError::UnknownCollection(collection.to_string()))?;

        source
            .scan_collection(&descriptor)
            .await
            .map_err(|e| SyncError::from_source(descriptor.key.as_str(), e))?;
        info!(
            operation = "scan",
            collection = %descriptor.title,
            locations = descriptor.locations.len(),
            "Collection scan requested"
        );
        Ok(descriptor)
    }
}

// A season mirrors onto every cached episode in it.
fn set_cached_watched(root: &mut CatalogRoot, path: &NodePath, watched: bool) -> bool {
    let Some(collection) = root.collection_mut(path.collection_title()) else {
        return false;
    };
    match path {
        NodePath::Collection { .. } => false,
        NodePath::Movie { movie, .. } => match collection.movie_mut(movie) {
            Some(movie) => {
                movie.watched = watched;
                true
            }
            None => false,
        },
        NodePath::Show { show, .. } => match collection.show_mut(show) {
            Some(show) => {
                show.watched = watched;
                true
            }
            None => false,
        },
        NodePath::Season { show, season, .. } => {
            let Some(season) = collection.show_mut(show).and_then(|s| s.seasons.get_mut(season)) else {
                return false;
            };
            for episode in season.episodes.values_mut() {
                episode.watched = watched;
            }
            true
        }
        NodePath::Episode { show, season, episode, .. } => {
            let episode = collection
                .show_mut(show)
                .and_then(|s| s.seasons.get_mut(season))
                .and_then(|s| s.episodes.get_mut(episode));
            match episode {
                Some(episode) => {
                    episode.watched = watched;
                    true
                }
                None => false,
            }
        }
    }
}

impl EngineInner {
    async fn ensure_loaded(&self) -> Result<(), SyncError> {
        if self.loaded.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.state.set(EngineState::Loading);
        let store = Arc::clone(&self.store);
        let root = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| SyncError::Snapshot(format!("snapshot load task failed: {}", e)))?
            .map_err(SyncError::snapshot)?;

        let counts = root.counts();
        let index = CatalogIndex::build(&root);
        {
            let mut catalog = self.catalog.write().await;
            catalog.root = root;
            catalog.index = index;
        }
        self.loaded.store(true, Ordering::SeqCst);
        info!(
            operation = "load",
            location = %self.store.location(),
            collections = counts.collections,
            shows = counts.shows,
            movies = counts.movies,
            "Loaded cached catalog"
        );
        Ok(())
    }

    async fn persist(&self) -> Result<(), SyncError> {
        let root = self.catalog.read().await.root.clone();
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save(&root))
            .await
            .map_err(|e| SyncError::Snapshot(format!("snapshot save task failed: {}", e)))?
            .map_err(SyncError::snapshot)
    }

    async fn run_pass(&self, cancel: CancellationToken) -> Result<PassSummary, SyncError> {
        if let Err(e) = self.ensure_loaded().await {
            error!(operation = "load", error = %e, "Failed to load cached catalog");
            self.state.set(EngineState::Failed);
            return Err(e);
        }

        let previous = self.catalog.read().await.root.clone();
        let outcome = match self.orchestrator.run_pass(&cancel, previous).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.state.set(EngineState::Failed);
                return Err(e);
            }
        };

        let mut summary = PassSummary::from_outcome(&outcome, false);
        let index = CatalogIndex::build(&outcome.tree);
        {
            let mut catalog = self.catalog.write().await;
            catalog.root = outcome.tree;
            catalog.index = index;
        }

        if self.persist_after_pass {
            self.state.set(EngineState::Persisting);
            if let Err(e) = self.persist().await {
                error!(operation = "persist", error = %e, "Failed to write snapshot after pass");
                self.state.set(EngineState::Failed);
                return Err(e);
            }
            summary.persisted = true;
        }
        self.state.set(EngineState::Idle);

        if let Ok(mut last) = self.last_summary.lock() {
            *last = Some(summary.clone());
        }
        Ok(summary)
    }
}
