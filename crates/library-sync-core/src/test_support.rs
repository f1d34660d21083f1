//! In-memory catalog source used by orchestrator and engine tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use library_sync_models::{
    ChildDescriptor, CollectionDescriptor, CollectionKind, DetailRecord, EntryDescriptor,
};
use library_sync_sources::{CatalogSource, SourceError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + ChronoDuration::seconds(secs)
}

#[derive(Default)]
pub(crate) struct FakeSource {
    collections: Mutex<Vec<CollectionDescriptor>>,
    entries: Mutex<HashMap<String, Vec<EntryDescriptor>>>,
    children: Mutex<HashMap<String, Vec<ChildDescriptor>>>,
    details: Mutex<HashMap<String, DetailRecord>>,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    actions: Mutex<Vec<String>>,
    fail_collections: AtomicBool,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_collection(&self, key: &str, title: &str, kind: CollectionKind) {
        self.collections
            .lock()
            .unwrap()
            .push(CollectionDescriptor::new(key, title, kind));
        self.entries.lock().unwrap().entry(key.to_string()).or_default();
    }

    pub fn set_entries(&self, collection_key: &str, entries: Vec<EntryDescriptor>) {
        self.entries.lock().unwrap().insert(collection_key.to_string(), entries);
    }

    pub fn add_movie(&self, collection_key: &str, rating_key: &str, title: &str) {
        self.entries
            .lock()
            .unwrap()
            .entry(collection_key.to_string())
            .or_default()
            .push(EntryDescriptor::new(rating_key, title));
    }

    /// Add a show whose seasons are given as `(number, episode count)`. Season
    /// rating keys are `{show}-s{n}`, episode rating keys `{show}-s{n}-e{m}`.
    pub fn add_show(&self, collection_key: &str, rating_key: &str, title: &str, seasons: &[(u32, u32)]) {
        self.add_movie(collection_key, rating_key, title);
        let mut children = self.children.lock().unwrap();
        let season_children = seasons
            .iter()
            .map(|(n, _)| ChildDescriptor::season(format!("{}-s{}", rating_key, n), *n, format!("Season {}", n)))
            .collect();
        children.insert(rating_key.to_string(), season_children);
        for (n, episodes) in seasons {
            let season_key = format!("{}-s{}", rating_key, n);
            let episode_children = (1..=*episodes)
                .map(|e| ChildDescriptor::episode(format!("{}-e{}", season_key, e), e, format!("Episode {}", e)))
                .collect();
            children.insert(season_key, episode_children);
        }
    }

    pub fn add_child(&self, parent_key: &str, child: ChildDescriptor) {
        self.children
            .lock()
            .unwrap()
            .entry(parent_key.to_string())
            .or_default()
            .push(child);
    }

    pub fn rename_entry(&self, collection_key: &str, rating_key: &str, title: &str) {
        if let Some(entries) = self.entries.lock().unwrap().get_mut(collection_key) {
            for entry in entries.iter_mut().filter(|e| e.rating_key == rating_key) {
                entry.title = title.to_string();
            }
        }
    }

    pub fn remove_entry(&self, collection_key: &str, rating_key: &str) {
        if let Some(entries) = self.entries.lock().unwrap().get_mut(collection_key) {
            entries.retain(|e| e.rating_key != rating_key);
        }
    }

    pub fn set_detail(&self, key: &str, detail: DetailRecord) {
        self.details.lock().unwrap().insert(key.to_string(), detail);
    }

    /// Every call addressed by `key` fails.
    pub fn fail(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    pub fn heal(&self, key: &str) {
        self.failing.lock().unwrap().remove(key);
    }

    pub fn fail_collections(&self, fail: bool) {
        self.fail_collections.store(fail, Ordering::SeqCst);
    }

    pub fn delay(&self, key: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(key.to_string(), delay);
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Watched-state changes and scans, as `verb:key`.
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, key: &str) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(key).copied();
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(key) {
            return Err(SourceError::Status {
                url: format!("fake://{}", key),
                status: 500,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogSource for FakeSource {
    fn source_name(&self) -> &str {
        "fake"
    }

    async fn list_collections(&self) -> Result<Vec<CollectionDescriptor>, SourceError> {
        if self.fail_collections.load(Ordering::SeqCst) {
            return Err(SourceError::Transport {
                url: "fake://sections".into(),
                message: "connection refused".into(),
            });
        }
        Ok(self.collections.lock().unwrap().clone())
    }

    async fn list_entries(&self, collection_key: &str) -> Result<Vec<EntryDescriptor>, SourceError> {
        self.enter(collection_key).await?;
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(collection_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_children(&self, entry_key: &str) -> Result<Vec<ChildDescriptor>, SourceError> {
        self.enter(entry_key).await?;
        Ok(self
            .children
            .lock()
            .unwrap()
            .get(entry_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_detail(&self, key: &str) -> Result<DetailRecord, SourceError> {
        self.enter(key).await?;
        Ok(self.details.lock().unwrap().get(key).cloned().unwrap_or_else(|| DetailRecord {
            rating_key: key.to_string(),
            ..DetailRecord::default()
        }))
    }

    async fn scrobble(&self, rating_key: &str) -> Result<(), SourceError> {
        self.enter(rating_key).await?;
        self.actions.lock().unwrap().push(format!("scrobble:{}", rating_key));
        Ok(())
    }

    async fn unscrobble(&self, rating_key: &str) -> Result<(), SourceError> {
        self.enter(rating_key).await?;
        self.actions.lock().unwrap().push(format!("unscrobble:{}", rating_key));
        Ok(())
    }

    async fn scan_collection(&self, collection: &CollectionDescriptor) -> Result<(), SourceError> {
        self.enter(&collection.key).await?;
        self.actions.lock().unwrap().push(format!("scan:{}", collection.key));
        Ok(())
    }
}
