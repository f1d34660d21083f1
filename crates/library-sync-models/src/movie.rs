use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::external_ids::ExternalIds;

/// A movie inside a movie-typed collection. Keyed by `rating_key`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieEntry {
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
    pub refreshed_at: DateTime<Utc>,
}

impl MovieEntry {
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
            refreshed_at,
        }
    }
}
