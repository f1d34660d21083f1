use chrono::{DateTime, Duration, Utc};
use library_sync_models::CatalogRoot;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;
use crate::index::NodePath;

/// Number of nodes removed at each level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    pub collections: usize,
    pub shows: usize,
    pub seasons: usize,
    pub episodes: usize,
    pub movies: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.collections + self.shows + self.seasons + self.episodes + self.movies
    }
}

/// Removes nodes that were not confirmed present since `cutoff`.
///
/// A node is dropped when its `refreshed_at` is strictly earlier than the
/// cutoff. Collections alone get an extra grace window. Children of a node in
/// the spared set are left untouched, because their listing never completed.
#[derive(Debug, Clone)]
pub struct StaleEvictor {
    cutoff: DateTime<Utc>,
    collection_grace: Duration,
    spared: HashSet<NodePath>,
}

impl StaleEvictor {
    pub fn new(cutoff: DateTime<Utc>) -> Self {
        Self {
            cutoff,
            collection_grace: Duration::zero(),
            spared: HashSet::new(),
        }
    }

    pub fn with_collection_grace(mut self, grace: Duration) -> Self {
        self.collection_grace = grace;
        self
    }

    pub fn sparing(mut self, unlisted: impl IntoIterator<Item = NodePath>) -> Self {
        self.spared.extend(unlisted);
        self
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    pub fn evict(&self, root: &mut CatalogRoot) -> EvictionReport {
        let mut report = EvictionReport::default();
        let cutoff = self.cutoff;
        let collection_cutoff = cutoff - self.collection_grace;

        root.collections.retain(|collection| {
            let keep = collection.refreshed_at >= collection_cutoff;
            if !keep {
                debug!(collection = %collection.title, "Evicting stale collection");
                report.collections += 1;
            }
            keep
        });

        for collection in &mut root.collections {
            let title = collection.title.clone();
            if self.spared.contains(&NodePath::collection(title.as_str())) {
                debug!(collection = %title, "Collection listing incomplete, keeping its entries");
                continue;
            }

            collection.movies.retain(|movie| {
                let keep = movie.refreshed_at >= cutoff;
                if !keep {
                    report.movies += 1;
                }
                keep
            });

            collection.shows.retain(|show| {
                let keep = show.refreshed_at >= cutoff;
                if !keep {
                    debug!(collection = %title, show = %show.title, "Evicting stale show");
                    report.shows += 1;
                }
                keep
            });

            for show in &mut collection.shows {
                let show_key = show.key().to_string();
                if self.spared.contains(&NodePath::show(title.as_str(), show_key.as_str())) {
                    continue;
                }
                show.seasons.retain(|_, season| {
                    let keep = season.refreshed_at >= cutoff;
                    if !keep {
                        report.seasons += 1;
                    }
                    keep
                });
                for (number, season) in show.seasons.iter_mut() {
                    if self.spared.contains(&NodePath::season(title.as_str(), show_key.as_str(), *number)) {
                        continue;
                    }
                    season.episodes.retain(|_, episode| {
                        let keep = episode.refreshed_at >= cutoff;
                        if !keep {
                            report.episodes += 1;
                        }
                        keep
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use library_sync_models::{CollectionKind, EpisodeEntry, LibraryCollection, MovieEntry, SeasonEntry, ShowEntry};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn tree() -> CatalogRoot {
        let mut fresh_season = SeasonEntry::new(1, t(10));
        fresh_season.episodes.insert(1, EpisodeEntry::new(1, "fresh", t(10)));
        fresh_season.episodes.insert(2, EpisodeEntry::new(2, "exactly at cutoff", t(5)));
        fresh_season.episodes.insert(3, EpisodeEntry::new(3, "stale", t(4)));
        let stale_season = SeasonEntry::new(2, t(0));

        let mut fresh_show = ShowEntry::new("10", "Fresh", t(10));
        fresh_show.seasons.insert(1, fresh_season);
        fresh_show.seasons.insert(2, stale_season);
        let stale_show = ShowEntry::new("11", "Stale", t(0));

        let mut tv = LibraryCollection::new("1", "TV", CollectionKind::Show, t(10));
        tv.shows.push(fresh_show);
        tv.shows.push(stale_show);

        let mut films = LibraryCollection::new("2", "Films", CollectionKind::Movie, t(10));
        films.movies.push(MovieEntry::new("20", "Kept", t(6)));
        films.movies.push(MovieEntry::new("21", "Gone", t(1)));

        let old = LibraryCollection::new("3", "Old", CollectionKind::Movie, t(-100));
        let recent = LibraryCollection::new("4", "Recent", CollectionKind::Movie, t(-30));

        CatalogRoot { collections: vec![tv, films, old, recent] }
    }

    #[test]
    fn test_removes_exactly_nodes_before_cutoff() {
        let mut root = tree();
        let report = StaleEvictor::new(t(5)).evict(&mut root);

        let titles: Vec<_> = root.collections.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["TV", "Films"]);

        let tv = root.collection("TV").unwrap();
        assert_eq!(tv.shows.len(), 1);
        let show = &tv.shows[0];
        assert_eq!(show.seasons.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(show.seasons[&1].episodes.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(root.collection("Films").unwrap().movies.len(), 1);

        assert_eq!(
            report,
            EvictionReport { collections: 2, shows: 1, seasons: 1, episodes: 1, movies: 1 }
        );
        assert_eq!(report.total(), 6);
    }

    #[test]
    fn test_grace_applies_to_collections_only() {
        let mut root = tree();
        let report = StaleEvictor::new(t(5))
            .with_collection_grace(Duration::seconds(60))
            .evict(&mut root);

        // "Recent" at t-30 falls inside the grace window, "Old" at t-100 does not
        assert!(root.collection("Recent").is_some());
        assert!(root.collection("Old").is_none());
        assert_eq!(report.collections, 1);
        // Lower levels still use the bare cutoff
        assert_eq!(report.shows, 1);
        assert_eq!(report.episodes, 1);
    }

    #[test]
    fn test_spared_nodes_keep_their_children() {
        let mut root = tree();
        StaleEvictor::new(t(5))
            .sparing([NodePath::show("TV", "10"), NodePath::collection("Films")])
            .evict(&mut root);

        let show = root.collection("TV").unwrap().show("10").unwrap();
        assert_eq!(show.seasons.len(), 2);
        assert_eq!(show.seasons[&1].episodes.len(), 3);
        assert_eq!(root.collection("Films").unwrap().movies.len(), 2);
        // Sparing a show's children does not spare its stale siblings
        assert!(root.collection("TV").unwrap().show("11").is_none());
    }

    #[test]
    fn test_spared_season_keeps_episodes() {
        let mut root = tree();
        StaleEvictor::new(t(5))
            .sparing([NodePath::season("TV", "10", 1)])
            .evict(&mut root);

        let show = root.collection("TV").unwrap().show("10").unwrap();
        assert_eq!(show.seasons[&1].episodes.len(), 3);
        assert!(!show.seasons.contains_key(&2));
    }
}
