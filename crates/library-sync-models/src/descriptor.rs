//! Records returned by a remote catalog source, before they become tree nodes.

use chrono::{DateTime, Utc};
use crate::catalog::{CollectionKind, Location};

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionDescriptor {
    pub key: String,
    pub title: String,
    pub kind: CollectionKind,
    pub agent: String,
    pub scanner: String,
    pub language: String,
    pub uuid: String,
    pub locations: Vec<Location>,
}

impl CollectionDescriptor {
    pub fn new(key: impl Into<String>, title: impl Into<String>, kind: CollectionKind) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            kind,
            agent: String::new(),
            scanner: String::new(),
            language: String::new(),
            uuid: String::new(),
            locations: Vec::new(),
        }
    }
}

/// A show or movie as listed under a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryDescriptor {
    pub rating_key: String,
    pub key: String,
    pub guid: String,
    pub title: String,
    pub summary: String,
    pub year: Option<u32>,
    pub content_rating: String,
    pub user_rating: Option<f64>,
    pub audience_rating: Option<f64>,
    pub view_count: u32,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub added_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EntryDescriptor {
    pub fn new(rating_key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            rating_key: rating_key.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Season,
    Episode,
}

/// A season (child of a show) or an episode (child of a season).
#[derive(Debug, Clone, PartialEq)]
pub struct ChildDescriptor {
    pub kind: ChildKind,
    pub rating_key: String,
    pub guid: String,
    pub title: String,
    /// Season or episode number; `None` when the server omitted it
    pub index: Option<u32>,
    pub content_rating: String,
    pub year: Option<u32>,
    pub view_count: u32,
    pub duration_ms: Option<u64>,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub added_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChildDescriptor {
    pub fn new(kind: ChildKind, rating_key: impl Into<String>, index: Option<u32>, title: impl Into<String>) -> Self {
        Self {
            kind,
            rating_key: rating_key.into(),
            guid: String::new(),
            title: title.into(),
            index,
            content_rating: String::new(),
            year: None,
            view_count: 0,
            duration_ms: None,
            last_viewed_at: None,
            added_at: None,
            updated_at: None,
        }
    }

    pub fn season(rating_key: impl Into<String>, number: u32, title: impl Into<String>) -> Self {
        Self::new(ChildKind::Season, rating_key, Some(number), title)
    }

    pub fn episode(rating_key: impl Into<String>, number: u32, title: impl Into<String>) -> Self {
        Self::new(ChildKind::Episode, rating_key, Some(number), title)
    }
}

/// Full metadata for a single item (show, movie or episode).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailRecord {
    pub rating_key: String,
    pub guid: String,
    /// Item type as reported by the server ("show", "movie", "episode", ...)
    pub item_type: String,
    pub title: String,
    pub summary: String,
    pub year: Option<u32>,
    pub content_rating: String,
    pub index: Option<u32>,
    pub view_count: u32,
    pub duration_ms: Option<u64>,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub added_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub alternate_guids: Vec<String>,
}
