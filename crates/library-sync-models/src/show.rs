use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::external_ids::ExternalIds;

/// A TV show inside a show-typed collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShowEntry {
    pub rating_key: String,
    #[serde(default)]
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub year: Option<u32>,
    #[serde(default)]
    pub content_rating: String,
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub ids: ExternalIds,
    pub user_rating: Option<f64>,
    pub audience_rating: Option<f64>,
    #[serde(default)]
    pub watched: bool,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub added_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Season number -> season
    #[serde(default)]
    pub seasons: BTreeMap<u32, SeasonEntry>,
    pub refreshed_at: DateTime<Utc>,
}

impl ShowEntry {
    pub fn new(rating_key: impl Into<String>, title: impl Into<String>, refreshed_at: DateTime<Utc>) -> Self {
        Self {
            rating_key: rating_key.into(),
            key: String::new(),
            title: title.into(),
            summary: String::new(),
            year: None,
            content_rating: String::new(),
            guid: String::new(),
            ids: ExternalIds::default(),
            user_rating: None,
            audience_rating: None,
            watched: false,
            last_viewed_at: None,
            added_at: None,
            updated_at: None,
            seasons: BTreeMap::new(),
            refreshed_at,
        }
    }

    /// Identity of the show within its collection.
    ///
    /// The server-issued rating key when present, otherwise the title.
    pub fn key(&self) -> &str {
        if self.rating_key.is_empty() {
            &self.title
        } else {
            &self.rating_key
        }
    }

    pub fn episode_count(&self) -> usize {
        self.seasons.values().map(|s| s.episodes.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeasonEntry {
    pub number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub rating_key: String,
    /// Episode number -> episode
    #[serde(default)]
    pub episodes: BTreeMap<u32, EpisodeEntry>,
    pub refreshed_at: DateTime<Utc>,
}

impl SeasonEntry {
    pub fn new(number: u32, refreshed_at: DateTime<Utc>) -> Self {
        Self {
            number,
            title: String::new(),
            guid: String::new(),
            rating_key: String::new(),
            episodes: BTreeMap::new(),
            refreshed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeEntry {
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub rating_key: String,
    #[serde(default)]
    pub ids: ExternalIds,
    #[serde(default)]
    pub content_rating: String,
    pub year: Option<u32>,
    #[serde(default)]
    pub watched: bool,
    /// Runtime in milliseconds, as reported by the server
    pub duration_ms: Option<u64>,
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub added_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub refreshed_at: DateTime<Utc>,
}

impl EpisodeEntry {
    pub fn new(number: u32, title: impl Into<String>, refreshed_at: DateTime<Utc>) -> Self {
        Self {
            number,
            title: title.into(),
            guid: String::new(),
            rating_key: String::new(),
            ids: ExternalIds::default(),
            content_rating: String::new(),
            year: None,
            watched: false,
            duration_ms: None,
            last_viewed_at: None,
            added_at: None,
            updated_at: None,
            refreshed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_key_prefers_rating_key() {
        let now = Utc::now();
        let show = ShowEntry::new("4242", "Bluey", now);
        assert_eq!(show.key(), "4242");

        let untracked = ShowEntry::new("", "Bluey", now);
        assert_eq!(untracked.key(), "Bluey");
    }

    #[test]
    fn test_episode_count_spans_seasons() {
        let now = Utc::now();
        let mut show = ShowEntry::new("1", "Show", now);
        for season_number in 1..=2 {
            let mut season = SeasonEntry::new(season_number, now);
            for episode_number in 1..=3 {
                season.episodes.insert(episode_number, EpisodeEntry::new(episode_number, "ep", now));
            }
            show.seasons.insert(season_number, season);
        }
        assert_eq!(show.episode_count(), 6);
    }
}
