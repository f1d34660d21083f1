use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::movie::MovieEntry;
use crate::show::ShowEntry;

/// The whole catalog: every library collection the server exposes.
///
/// Collections are kept in listing order and keyed by title.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogRoot {
    #[serde(default)]
    pub collections: Vec<LibraryCollection>,
}

/// Per-level node counts, used for pass summaries and `status` output.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CatalogCounts {
    pub collections: usize,
    pub shows: usize,
    pub seasons: usize,
    pub episodes: usize,
    pub movies: usize,
}

impl CatalogRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn collection(&self, title: &str) -> Option<&LibraryCollection> {
        self.collections.iter().find(|c| c.title == title)
    }

    pub fn collection_mut(&mut self, title: &str) -> Option<&mut LibraryCollection> {
        self.collections.iter_mut().find(|c| c.title == title)
    }

    /// Collections of a single kind, in listing order.
    pub fn of_kind(&self, kind: CollectionKind) -> impl Iterator<Item = &LibraryCollection> {
        self.collections.iter().filter(move |c| c.kind == kind)
    }

    pub fn counts(&self) -> CatalogCounts {
        let mut counts = CatalogCounts {
            collections: self.collections.len(),
            ..CatalogCounts::default()
        };
        for collection in &self.collections {
            counts.movies += collection.movies.len();
            counts.shows += collection.shows.len();
            for show in &collection.shows {
                counts.seasons += show.seasons.len();
                counts.episodes += show.seasons.values().map(|s| s.episodes.len()).sum::<usize>();
            }
        }
        counts
    }
}

/// What a collection holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Show,
    Movie,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionKind::Show => write!(f, "show"),
            CollectionKind::Movie => write!(f, "movie"),
        }
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "show" => Ok(CollectionKind::Show),
            "movie" => Ok(CollectionKind::Movie),
            other => Err(format!("unknown library type: {}", other)),
        }
    }
}

/// A filesystem location backing a collection on the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub id: u64,
    pub path: String,
}

/// A library section (e.g. "TV Shows", "Movies").
///
/// Only one of `shows`/`movies` is populated, depending on `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryCollection {
    pub key: String,
    pub title: String,
    pub kind: CollectionKind,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub scanner: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub shows: Vec<ShowEntry>,
    #[serde(default)]
    pub movies: Vec<MovieEntry>,
    pub refreshed_at: DateTime<Utc>,
}

impl LibraryCollection {
    pub fn new(key: impl Into<String>, title: impl Into<String>, kind: CollectionKind, refreshed_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            kind,
            agent: String::new(),
            scanner: String::new(),
            language: String::new(),
            uuid: String::new(),
            locations: Vec::new(),
            shows: Vec::new(),
            movies: Vec::new(),
            refreshed_at,
        }
    }

    pub fn show(&self, key: &str) -> Option<&ShowEntry> {
        self.shows.iter().find(|s| s.key() == key)
    }

    pub fn show_mut(&mut self, key: &str) -> Option<&mut ShowEntry> {
        self.shows.iter_mut().find(|s| s.key() == key)
    }

    pub fn movie(&self, rating_key: &str) -> Option<&MovieEntry> {
        self.movies.iter().find(|m| m.rating_key == rating_key)
    }

    pub fn movie_mut(&mut self, rating_key: &str) -> Option<&mut MovieEntry> {
        self.movies.iter_mut().find(|m| m.rating_key == rating_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::show::{EpisodeEntry, SeasonEntry};

    #[test]
    fn test_collection_kind_parse() {
        assert_eq!("show".parse::<CollectionKind>().unwrap(), CollectionKind::Show);
        assert_eq!("Movie".parse::<CollectionKind>().unwrap(), CollectionKind::Movie);
        assert!("artist".parse::<CollectionKind>().is_err());
    }

    #[test]
    fn test_counts_walk_every_level() {
        let now = Utc::now();
        let mut show = ShowEntry::new("100", "Bluey", now);
        let mut season = SeasonEntry::new(1, now);
        season.episodes.insert(1, EpisodeEntry::new(1, "Magic Xylophone", now));
        season.episodes.insert(2, EpisodeEntry::new(2, "Hospital", now));
        show.seasons.insert(1, season);

        let mut tv = LibraryCollection::new("1", "TV Shows", CollectionKind::Show, now);
        tv.shows.push(show);
        let mut films = LibraryCollection::new("2", "Movies", CollectionKind::Movie, now);
        films.movies.push(MovieEntry::new("200", "Heat", now));

        let root = CatalogRoot { collections: vec![tv, films] };
        let counts = root.counts();
        assert_eq!(counts.collections, 2);
        assert_eq!(counts.shows, 1);
        assert_eq!(counts.seasons, 1);
        assert_eq!(counts.episodes, 2);
        assert_eq!(counts.movies, 1);
        assert_eq!(root.of_kind(CollectionKind::Movie).count(), 1);
    }

    #[test]
    fn test_snapshot_json_roundtrip_keeps_structure() {
        let now = Utc::now();
        let mut tv = LibraryCollection::new("1", "TV Shows", CollectionKind::Show, now);
        tv.shows.push(ShowEntry::new("100", "Bluey", now));
        let root = CatalogRoot { collections: vec![tv] };

        let json = serde_json::to_string(&root).unwrap();
        assert!(json.contains("\"kind\":\"show\""));
        let back: CatalogRoot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, root);
    }
}
