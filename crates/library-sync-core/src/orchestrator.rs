//! One synchronization pass: list collections, list their entries, fan out
//! per-show and per-movie fetch units, fold the results into the cached tree
//! and evict whatever the pass did not confirm.

use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use library_sync_config::SyncOptions;
use library_sync_models::{
    CatalogCounts, CatalogRoot, CollectionKind, DetailRecord, MovieEntry, SeasonEntry, ShowEntry,
};
use library_sync_sources::CatalogSource;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::Clock;
use crate::convert;
use crate::error::SyncError;
use crate::evict::{EvictionReport, StaleEvictor};
use crate::index::NodePath;
use crate::merge::{merge_catalog, ChildSet, Reconcile};
use crate::pool::{FailureHook, UnitFailure, WorkPool};
use crate::state::{EngineState, StateReporter};

#[derive(Debug, Clone)]
pub struct PassOptions {
    /// Upper bound on fetch units in flight
    pub max_concurrent_fetches: usize,
    /// Extra time a collection survives after it stops being listed
    pub collection_grace: Duration,
    pub fetch_movie_details: bool,
    pub fetch_episode_details: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 3,
            collection_grace: Duration::minutes(1),
            fetch_movie_details: true,
            fetch_episode_details: false,
        }
    }
}

impl From<&SyncOptions> for PassOptions {
    fn from(options: &SyncOptions) -> Self {
        Self {
            max_concurrent_fetches: options.max_concurrent_fetches,
            collection_grace: Duration::seconds(options.collection_grace_secs as i64),
            fetch_movie_details: options.fetch_movie_details,
            fetch_episode_details: options.fetch_episode_details,
        }
    }
}

/// Result of one pass. The tree is always complete, even when units failed or
/// the pass was canceled part way.
#[derive(Debug)]
pub struct PassOutcome {
    pub tree: CatalogRoot,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub canceled: bool,
    /// Collection-level listing failures. The affected collections were kept as cached.
    pub list_failures: Vec<SyncError>,
    pub failures: Vec<UnitFailure>,
    pub skipped: usize,
    pub eviction: EvictionReport,
    pub counts: CatalogCounts,
}

impl PassOutcome {
    fn untouched(tree: CatalogRoot, started_at: DateTime<Utc>) -> Self {
        let counts = tree.counts();
        Self {
            tree,
            started_at,
            finished_at: started_at,
            canceled: true,
            list_failures: Vec::new(),
            failures: Vec::new(),
            skipped: 0,
            eviction: EvictionReport::default(),
            counts,
        }
    }
}

enum FetchedUnit {
    Show(ShowSubtree),
    MovieDetail {
        collection: String,
        rating_key: String,
        detail: DetailRecord,
    },
}

/// Everything fetched below one show.
struct ShowSubtree {
    collection: String,
    show_key: String,
    detail: DetailRecord,
    seasons: BTreeMap<u32, SeasonEntry>,
    /// Seasons whose episode listing did not complete
    unlisted_seasons: Vec<u32>,
}

struct ShowWork {
    collection: String,
    show_key: String,
    rating_key: String,
}

struct MovieWork {
    collection: String,
    rating_key: String,
}

/// Where each show and movie sits in the tree, by collection title and entry key.
/// Valid until entries are added or removed.
#[derive(Default)]
struct EntryPositions {
    shows: HashMap<(String, String), (usize, usize)>,
    movies: HashMap<(String, String), (usize, usize)>,
}

impl EntryPositions {
    fn new(tree: &CatalogRoot) -> Self {
        let mut positions = Self::default();
        for (c, collection) in tree.collections.iter().enumerate() {
            for (i, show) in collection.shows.iter().enumerate() {
                positions
                    .shows
                    .entry((collection.title.clone(), show.key().to_string()))
                    .or_insert((c, i));
            }
            for (i, movie) in collection.movies.iter().enumerate() {
                positions
                    .movies
                    .entry((collection.title.clone(), movie.rating_key.clone()))
                    .or_insert((c, i));
            }
        }
        positions
    }

    fn show<'a>(&self, tree: &'a mut CatalogRoot, collection: &str, key: &str) -> Option<&'a mut ShowEntry> {
        let &(c, i) = self.shows.get(&(collection.to_string(), key.to_string()))?;
        tree.collections.get_mut(c)?.shows.get_mut(i)
    }

    fn movie<'a>(&self, tree: &'a mut CatalogRoot, collection: &str, key: &str) -> Option<&'a mut MovieEntry> {
        let &(c, i) = self.movies.get(&(collection.to_string(), key.to_string()))?;
        tree.collections.get_mut(c)?.movies.get_mut(i)
    }
}

pub struct FetchOrchestrator {
    source: Arc<dyn CatalogSource>,
    clock: Arc<dyn Clock>,
    options: PassOptions,
    state: StateReporter,
    failure_hook: Option<FailureHook>,
}

impl FetchOrchestrator {
    pub fn new(source: Arc<dyn CatalogSource>, clock: Arc<dyn Clock>, options: PassOptions) -> Self {
        Self {
            source,
            clock,
            options,
            state: StateReporter::new(),
            failure_hook: None,
        }
    }

    pub fn with_state_reporter(mut self, state: StateReporter) -> Self {
        self.state = state;
        self
    }

    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.failure_hook = Some(hook);
        self
    }

    pub fn options(&self) -> &PassOptions {
        &self.options
    }

    pub fn source_name(&self) -> &str {
        self.source.source_name()
    }

    /// Run one pass against `previous` and return the reconciled, evicted tree.
    ///
    /// Only a failure to list the top-level collections aborts the pass. Every
    /// other failure is contained: the affected subtree keeps its cached
    /// contents and the failure is reported in the outcome.
    #[instrument(skip_all, fields(source = %self.source.source_name()))]
    pub async fn run_pass(&self, cancel: &CancellationToken, previous: CatalogRoot) -> Result<PassOutcome, SyncError> {
        let started_at = self.clock.now();
        let mut spared: Vec<NodePath> = Vec::new();
        let mut list_failures = Vec::new();

        info!(
            operation = "pass_start",
            cached_collections = previous.collections.len(),
            max_concurrent_fetches = self.options.max_concurrent_fetches,
            "Starting library pass"
        );

        self.state.set(EngineState::FetchingTopLevel);
        if cancel.is_cancelled() {
            info!("Pass canceled before listing collections, keeping the cached catalog");
            return Ok(PassOutcome::untouched(previous, started_at));
        }

        let descriptors = self.source.list_collections().await.map_err(|e| {
            error!(
                operation = "list_collections",
                status = "error",
                error = %e,
                "Failed to list collections"
            );
            SyncError::list("collections", e)
        })?;

        let now = self.clock.now();
        let incoming = CatalogRoot {
            collections: descriptors
                .into_iter()
                .map(|desc| convert::collection_from_descriptor(desc, now))
                .collect(),
        };
        let listed: Vec<(String, String, CollectionKind)> = incoming
            .collections
            .iter()
            .map(|c| (c.title.clone(), c.key.clone(), c.kind))
            .collect();
        info!("Listed {} collections", listed.len());
        let mut tree = merge_catalog(previous, incoming);

        let mut show_work = Vec::new();
        let mut movie_work = Vec::new();
        for (title, key, kind) in &listed {
            if cancel.is_cancelled() {
                spared.push(NodePath::collection(title.as_str()));
                continue;
            }

            let entries = match self.source.list_entries(key).await {
                Ok(entries) => entries,
                Err(e) => {
                    let err = SyncError::list(format!("collection '{}'", title), e);
                    error!(
                        operation = "list_entries",
                        collection = %title,
                        status = "error",
                        error = %err,
                        "Failed to list collection entries, keeping cached contents"
                    );
                    spared.push(NodePath::collection(title.as_str()));
                    list_failures.push(err);
                    continue;
                }
            };

            let now = self.clock.now();
            let Some(collection) = tree.collection_mut(title) else {
                continue;
            };
            debug!(collection = %title, entries = entries.len(), "Listed collection entries");
            match kind {
                CollectionKind::Show => {
                    let shows: Vec<_> = entries
                        .into_iter()
                        .map(|entry| convert::show_from_entry(entry, now))
                        .collect();
                    for show in &shows {
                        show_work.push(ShowWork {
                            collection: title.clone(),
                            show_key: show.key().to_string(),
                            rating_key: show.rating_key.clone(),
                        });
                    }
                    collection.shows = ChildSet::union(std::mem::take(&mut collection.shows), shows);
                }
                CollectionKind::Movie => {
                    let movies: Vec<_> = entries
                        .into_iter()
                        .map(|entry| convert::movie_from_entry(entry, now))
                        .collect();
                    for movie in &movies {
                        movie_work.push(MovieWork {
                            collection: title.clone(),
                            rating_key: movie.rating_key.clone(),
                        });
                    }
                    collection.movies = ChildSet::union(std::mem::take(&mut collection.movies), movies);
                }
            }
        }

        self.state.set(EngineState::FanningOut);
        let mut pool = WorkPool::new(self.options.max_concurrent_fetches, cancel.clone());
        if let Some(hook) = &self.failure_hook {
            pool = pool.with_failure_hook(Arc::clone(hook));
        }

        // Shows stay in here until their unit completes; leftovers are spared
        let mut pending_shows: HashSet<NodePath> = HashSet::new();
        for work in show_work {
            let path = NodePath::show(work.collection.as_str(), work.show_key.as_str());
            pending_shows.insert(path.clone());
            if work.rating_key.is_empty() {
                warn!(show = %path, "Show has no rating key, cannot list its seasons");
                continue;
            }
            let source = Arc::clone(&self.source);
            let clock = Arc::clone(&self.clock);
            let episode_details = self.options.fetch_episode_details;
            pool.submit(format!("show {}", path), move |cancel| {
                async move {
                    fetch_show(source.as_ref(), clock.as_ref(), work, episode_details, &cancel)
                        .await
                        .map(FetchedUnit::Show)
                }
                .boxed()
            })
            .await;
        }

        if self.options.fetch_movie_details {
            for work in movie_work {
                let source = Arc::clone(&self.source);
                let label = format!("movie {}/{}", work.collection, work.rating_key);
                pool.submit(label, move |_cancel| {
                    async move {
                        let detail = source
                            .fetch_detail(&work.rating_key)
                            .await
                            .map_err(|e| SyncError::from_source(work.rating_key.as_str(), e))?;
                        Ok(FetchedUnit::MovieDetail {
                            collection: work.collection,
                            rating_key: work.rating_key,
                            detail,
                        })
                    }
                    .boxed()
                })
                .await;
            }
        }

        let outcome = pool.wait().await;

        // Single writer: results are folded in one at a time
        self.state.set(EngineState::Reconciling);
        let positions = EntryPositions::new(&tree);
        for unit in outcome.completed {
            match unit {
                FetchedUnit::Show(subtree) => {
                    let path = NodePath::show(subtree.collection.as_str(), subtree.show_key.as_str());
                    pending_shows.remove(&path);
                    for number in &subtree.unlisted_seasons {
                        spared.push(NodePath::season(
                            subtree.collection.as_str(),
                            subtree.show_key.as_str(),
                            *number,
                        ));
                    }
                    let Some(show) = positions.show(&mut tree, &subtree.collection, &subtree.show_key) else {
                        continue;
                    };
                    convert::apply_show_detail(show, &subtree.detail);
                    let cached = show.take_children();
                    show.set_children(ChildSet::union(cached, subtree.seasons));
                }
                FetchedUnit::MovieDetail {
                    collection,
                    rating_key,
                    detail,
                } => {
                    if let Some(movie) = positions.movie(&mut tree, &collection, &rating_key) {
                        convert::apply_movie_detail(movie, &detail);
                    }
                }
            }
        }
        if !pending_shows.is_empty() {
            debug!(shows = pending_shows.len(), "Keeping cached seasons for shows that were not fetched");
        }
        spared.extend(pending_shows);

        let canceled = cancel.is_cancelled();
        self.state.set(EngineState::Evicting);
        let eviction = StaleEvictor::new(started_at)
            .with_collection_grace(self.options.collection_grace)
            .sparing(spared)
            .evict(&mut tree);

        let counts = tree.counts();
        let finished_at = self.clock.now();
        info!(
            operation = "pass_complete",
            canceled,
            collections = counts.collections,
            shows = counts.shows,
            episodes = counts.episodes,
            movies = counts.movies,
            failed_units = outcome.failures.len(),
            skipped_units = outcome.skipped,
            evicted = eviction.total(),
            "Library pass finished"
        );

        Ok(PassOutcome {
            tree,
            started_at,
            finished_at,
            canceled,
            list_failures,
            failures: outcome.failures,
            skipped: outcome.skipped,
            eviction,
            counts,
        })
    }
}

/// Fetch one show's detail, its seasons and each season's episodes.
///
/// Losing the show detail or the season listing fails the unit. A season whose
/// episodes cannot be listed is reported as unlisted and the unit carries on.
async fn fetch_show(
    source: &dyn CatalogSource,
    clock: &dyn Clock,
    work: ShowWork,
    episode_details: bool,
    cancel: &CancellationToken,
) -> Result<ShowSubtree, SyncError> {
    let rating_key = work.rating_key.as_str();
    let detail = source
        .fetch_detail(rating_key)
        .await
        .map_err(|e| SyncError::from_source(rating_key, e))?;
    if cancel.is_cancelled() {
        return Err(SyncError::Canceled);
    }

    let children = source
        .list_children(rating_key)
        .await
        .map_err(|e| SyncError::from_source(rating_key, e))?;
    let now = clock.now();

    let mut seasons = BTreeMap::new();
    for child in children {
        match convert::season_from_child(child, now) {
            Ok(season) => {
                seasons.insert(season.number, season);
            }
            Err(e) => warn!(show = %work.show_key, error = %e, "Skipping malformed season record"),
        }
    }

    let mut unlisted_seasons = Vec::new();
    let season_keys: Vec<(u32, String)> = seasons
        .values()
        .map(|season| (season.number, season.rating_key.clone()))
        .collect();
    for (number, season_key) in season_keys {
        if cancel.is_cancelled() || season_key.is_empty() {
            unlisted_seasons.push(number);
            continue;
        }

        let episodes = match source.list_children(&season_key).await {
            Ok(episodes) => episodes,
            Err(e) => {
                warn!(
                    operation = "list_episodes",
                    show = %work.show_key,
                    season = number,
                    status = "error",
                    error = %e,
                    "Failed to list episodes, keeping cached episodes"
                );
                unlisted_seasons.push(number);
                continue;
            }
        };

        let now = clock.now();
        let mut fetched = BTreeMap::new();
        for child in episodes {
            let mut episode = match convert::episode_from_child(child, now) {
                Ok(episode) => episode,
                Err(e) => {
                    warn!(show = %work.show_key, season = number, error = %e, "Skipping malformed episode record");
                    continue;
                }
            };
            if episode_details && !episode.rating_key.is_empty() && !cancel.is_cancelled() {
                let fetched_detail = source.fetch_detail(&episode.rating_key).await;
                match fetched_detail {
                    Ok(detail) => convert::apply_episode_detail(&mut episode, &detail),
                    Err(e) => debug!(episode = %episode.rating_key, error = %e, "Episode detail unavailable"),
                }
            }
            fetched.insert(episode.number, episode);
        }
        if let Some(season) = seasons.get_mut(&number) {
            season.episodes = fetched;
        }
    }

    Ok(ShowSubtree {
        collection: work.collection,
        show_key: work.show_key,
        detail,
        seasons,
        unlisted_seasons,
    })
}
