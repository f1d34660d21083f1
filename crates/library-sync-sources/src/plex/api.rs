use chrono::{DateTime, TimeZone, Utc};
use library_sync_models::{
    ChildDescriptor, ChildKind, CollectionDescriptor, CollectionKind, DetailRecord, EntryDescriptor, Location,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};
use crate::error::SourceError;

const CLIENT_IDENTIFIER: &str = "plexcat";
const PRODUCT_NAME: &str = "plexcat";
const LIBRARY_IDENTIFIER: &str = "com.plexapp.plugins.library";

#[derive(Debug, Deserialize)]
struct MediaContainer {
    #[serde(rename = "Metadata")]
    metadata: Option<Vec<Value>>,
    #[serde(rename = "Directory")]
    directory: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct PlexResponse {
    #[serde(rename = "MediaContainer")]
    media_container: MediaContainer,
}

/// Thin HTTP layer over a Plex Media Server.
pub struct PlexHttpClient {
    client: Client,
    base_url: String,
}

impl PlexHttpClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static("application/json"),
                );
                headers.insert(
                    reqwest::header::HeaderName::from_static("x-plex-token"),
                    reqwest::header::HeaderValue::from_str(token)
                        .map_err(|_| SourceError::Config("token contains invalid header characters".to_string()))?,
                );
                headers.insert(
                    reqwest::header::HeaderName::from_static("x-plex-client-identifier"),
                    reqwest::header::HeaderValue::from_static(CLIENT_IDENTIFIER),
                );
                headers.insert(
                    reqwest::header::HeaderName::from_static("x-plex-product"),
                    reqwest::header::HeaderValue::from_static(PRODUCT_NAME),
                );
                headers.insert(
                    reqwest::header::HeaderName::from_static("x-plex-version"),
                    reqwest::header::HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
                );
                headers
            })
            .build()
            .map_err(|e| SourceError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_container(&self, path: &str) -> Result<MediaContainer, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        trace!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::from_reqwest(&url, e))?;
        // Plex answers some endpoints with an empty body instead of an empty container
        if body.trim().is_empty() {
            return Ok(MediaContainer {
                metadata: None,
                directory: None,
            });
        }
        let parsed: PlexResponse = serde_json::from_str(&body).map_err(|e| SourceError::Decode {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(parsed.media_container)
    }

    // Endpoints that change server state answer with nothing worth decoding
    async fn get_action(&self, path: &str, query: &[(&str, &str)]) -> Result<(), SourceError> {
        let url = format!("{}{}", self.base_url, path);
        trace!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    pub async fn scrobble(&self, rating_key: &str) -> Result<(), SourceError> {
        self.get_action("/:/scrobble", &[("key", rating_key), ("identifier", LIBRARY_IDENTIFIER)])
            .await
    }

    pub async fn unscrobble(&self, rating_key: &str) -> Result<(), SourceError> {
        self.get_action("/:/unscrobble", &[("key", rating_key), ("identifier", LIBRARY_IDENTIFIER)])
            .await
    }

    /// Refresh a section, limited to one folder when `location` is given.
    pub async fn refresh_section(&self, section_key: &str, location: Option<&str>) -> Result<(), SourceError> {
        let path = format!("/library/sections/{}/refresh", section_key);
        match location {
            Some(location) => self.get_action(&path, &[("path", location)]).await,
            None => self.get_action(&path, &[]).await,
        }
    }

    pub async fn get_sections(&self) -> Result<Vec<CollectionDescriptor>, SourceError> {
        let container = self.get_container("/library/sections").await?;
        Ok(parse_sections(container.directory.as_deref().unwrap_or_default()))
    }

    pub async fn get_section_items(&self, section_key: &str) -> Result<Vec<EntryDescriptor>, SourceError> {
        let path = format!("/library/sections/{}/all?includeGuids=1", section_key);
        let container = self.get_container(&path).await?;
        Ok(parse_entries(container.metadata.as_deref().unwrap_or_default()))
    }

    pub async fn get_children(&self, rating_key: &str) -> Result<Vec<ChildDescriptor>, SourceError> {
        let path = format!("/library/metadata/{}/children", rating_key);
        let container = self.get_container(&path).await?;
        Ok(parse_children(container.metadata.as_deref().unwrap_or_default()))
    }

    pub async fn get_metadata(&self, rating_key: &str) -> Result<DetailRecord, SourceError> {
        let path = format!("/library/metadata/{}?includeGuids=1", rating_key);
        let container = self.get_container(&path).await?;
        let item = container
            .metadata
            .as_ref()
            .and_then(|items| items.first())
            .ok_or_else(|| SourceError::malformed(rating_key, "metadata response holds no item"))?;
        parse_detail(item).ok_or_else(|| SourceError::malformed(rating_key, "metadata item has no ratingKey"))
    }
}

/// Library sections that hold shows or movies. Music, photo and other
/// section types are skipped.
pub fn parse_sections(directory: &[Value]) -> Vec<CollectionDescriptor> {
    let mut sections = Vec::new();
    for dir in directory {
        let key = value_string(dir.get("key")).unwrap_or_default();
        let title = value_string(dir.get("title")).unwrap_or_default();
        let type_ = value_string(dir.get("type")).unwrap_or_default();

        let kind = match type_.parse::<CollectionKind>() {
            Ok(kind) => kind,
            Err(_) => {
                debug!(section = %title, section_type = %type_, "Skipping unsupported library section");
                continue;
            }
        };
        if key.is_empty() || title.is_empty() {
            debug!("Skipping library section without key or title");
            continue;
        }

        let mut section = CollectionDescriptor::new(key, title, kind);
        section.agent = value_string(dir.get("agent")).unwrap_or_default();
        section.scanner = value_string(dir.get("scanner")).unwrap_or_default();
        section.language = value_string(dir.get("language")).unwrap_or_default();
        section.uuid = value_string(dir.get("uuid")).unwrap_or_default();
        if let Some(locations) = dir.get("Location").and_then(|l| l.as_array()) {
            section.locations = locations
                .iter()
                .filter_map(|loc| {
                    Some(Location {
                        id: value_u64(loc.get("id")).unwrap_or(0),
                        path: value_string(loc.get("path"))?,
                    })
                })
                .collect();
        }
        sections.push(section);
    }
    sections
}

pub fn parse_entries(metadata: &[Value]) -> Vec<EntryDescriptor> {
    let mut entries = Vec::with_capacity(metadata.len());
    let mut skipped = 0;
    for (idx, item) in metadata.iter().enumerate() {
        match parse_entry(item) {
            Some(entry) => entries.push(entry),
            None => {
                skipped += 1;
                if skipped <= 3 {
                    let title = item.get("title").and_then(|t| t.as_str()).unwrap_or("unknown");
                    debug!("Skipped item[{}] '{}' without ratingKey or title", idx, title);
                }
            }
        }
    }
    if skipped > 0 {
        debug!("Skipped {} items that couldn't be parsed", skipped);
    }
    entries
}

fn parse_entry(item: &Value) -> Option<EntryDescriptor> {
    let rating_key = value_string(item.get("ratingKey"))?;
    let title = value_string(item.get("title"))?;

    Some(EntryDescriptor {
        rating_key,
        key: value_string(item.get("key")).unwrap_or_default(),
        guid: value_string(item.get("guid")).unwrap_or_default(),
        title,
        summary: value_string(item.get("summary")).unwrap_or_default(),
        year: value_u32(item.get("year")),
        content_rating: value_string(item.get("contentRating")).unwrap_or_default(),
        user_rating: value_f64(item.get("userRating")),
        audience_rating: value_f64(item.get("audienceRating")),
        view_count: value_u32(item.get("viewCount")).unwrap_or(0),
        last_viewed_at: parse_timestamp(item.get("lastViewedAt")),
        added_at: parse_timestamp(item.get("addedAt")),
        updated_at: parse_timestamp(item.get("updatedAt")),
    })
}

/// Seasons (children of a show) or episodes (children of a season).
/// Pseudo-entries such as "All episodes" have no known type and are dropped.
pub fn parse_children(metadata: &[Value]) -> Vec<ChildDescriptor> {
    let mut children = Vec::with_capacity(metadata.len());
    for item in metadata {
        let kind = match item.get("type").and_then(|t| t.as_str()) {
            Some("season") => ChildKind::Season,
            Some("episode") => ChildKind::Episode,
            other => {
                trace!(item_type = ?other, "Skipping child of unknown type");
                continue;
            }
        };
        let Some(rating_key) = value_string(item.get("ratingKey")) else {
            debug!("Skipping child without ratingKey");
            continue;
        };

        let mut child = ChildDescriptor::new(
            kind,
            rating_key,
            value_u32(item.get("index")),
            value_string(item.get("title")).unwrap_or_default(),
        );
        child.guid = value_string(item.get("guid")).unwrap_or_default();
        child.content_rating = value_string(item.get("contentRating")).unwrap_or_default();
        child.year = value_u32(item.get("year"));
        child.view_count = value_u32(item.get("viewCount")).unwrap_or(0);
        child.duration_ms = value_u64(item.get("duration"));
        child.last_viewed_at = parse_timestamp(item.get("lastViewedAt"));
        child.added_at = parse_timestamp(item.get("addedAt"));
        child.updated_at = parse_timestamp(item.get("updatedAt"));
        children.push(child);
    }
    children
}

pub fn parse_detail(item: &Value) -> Option<DetailRecord> {
    Some(DetailRecord {
        rating_key: value_string(item.get("ratingKey"))?,
        guid: value_string(item.get("guid")).unwrap_or_default(),
        item_type: value_string(item.get("type")).unwrap_or_default(),
        title: value_string(item.get("title")).unwrap_or_default(),
        summary: value_string(item.get("summary")).unwrap_or_default(),
        year: value_u32(item.get("year")),
        content_rating: value_string(item.get("contentRating")).unwrap_or_default(),
        index: value_u32(item.get("index")),
        view_count: value_u32(item.get("viewCount")).unwrap_or(0),
        duration_ms: value_u64(item.get("duration")),
        last_viewed_at: parse_timestamp(item.get("lastViewedAt")),
        added_at: parse_timestamp(item.get("addedAt")),
        updated_at: parse_timestamp(item.get("updatedAt")),
        alternate_guids: parse_guid_array(item.get("Guid").unwrap_or(&Value::Null)),
    })
}

fn parse_guid_array(guid_value: &Value) -> Vec<String> {
    if let Some(guid_array) = guid_value.as_array() {
        guid_array
            .iter()
            .filter_map(|guid_obj| {
                guid_obj
                    .get("id")
                    .and_then(|i| i.as_str())
                    // Sometimes GUIDs are plain strings
                    .or_else(|| guid_obj.as_str())
                    .map(str::to_string)
            })
            .collect()
    } else if let Some(id) = guid_value.get("id").and_then(|i| i.as_str()) {
        vec![id.to_string()]
    } else if let Some(id_str) = guid_value.as_str() {
        vec![id_str.to_string()]
    } else {
        Vec::new()
    }
}

/// Zero means "never" in Plex responses.
fn parse_timestamp(timestamp: Option<&Value>) -> Option<DateTime<Utc>> {
    value_i64(timestamp)
        .filter(|ts| *ts != 0)
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

fn value_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// Plex is inconsistent about numbers: some come back as strings, some flags as booleans
fn value_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn value_u64(value: Option<&Value>) -> Option<u64> {
    value_i64(value).and_then(|v| u64::try_from(v).ok())
}

fn value_u32(value: Option<&Value>) -> Option<u32> {
    value_i64(value).and_then(|v| u32::try_from(v).ok())
}

fn value_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sections_skips_unsupported_types() {
        let directory = json!([
            {"key": "1", "title": "TV Shows", "type": "show", "agent": "tv.plex.agents.series",
             "uuid": "abc", "Location": [{"id": 3, "path": "/data/tv"}]},
            {"key": "2", "title": "Movies", "type": "movie"},
            {"key": "3", "title": "Music", "type": "artist"}
        ]);
        let sections = parse_sections(directory.as_array().unwrap());

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].kind, CollectionKind::Show);
        assert_eq!(sections[0].agent, "tv.plex.agents.series");
        assert_eq!(sections[0].locations, vec![Location { id: 3, path: "/data/tv".into() }]);
        assert_eq!(sections[1].kind, CollectionKind::Movie);
    }

    #[test]
    fn test_parse_entries_tolerates_string_numbers() {
        let metadata = json!([
            {"ratingKey": "100", "title": "Heat", "year": "1995", "viewCount": 2,
             "userRating": "8.5", "lastViewedAt": 1700000000, "addedAt": 0},
            {"ratingKey": 101, "title": "Ronin", "year": 1998},
            {"title": "No key"}
        ]);
        let entries = parse_entries(metadata.as_array().unwrap());

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].year, Some(1995));
        assert_eq!(entries[0].user_rating, Some(8.5));
        assert_eq!(entries[0].view_count, 2);
        assert!(entries[0].last_viewed_at.is_some());
        assert!(entries[0].added_at.is_none());
        assert_eq!(entries[1].rating_key, "101");
    }

    #[test]
    fn test_parse_children_by_type() {
        let metadata = json!([
            {"type": "season", "ratingKey": "11", "index": 1, "title": "Season 1"},
            {"type": "season", "ratingKey": "10", "index": 0, "title": "Specials"},
            {"type": "episode", "ratingKey": "12", "index": 4, "title": "Pilot", "duration": 1800000},
            {"type": "directory", "ratingKey": "13", "title": "All episodes"},
            {"type": "episode", "title": "Missing key"}
        ]);
        let children = parse_children(metadata.as_array().unwrap());

        assert_eq!(children.len(), 3);
        assert_eq!(children[0].kind, ChildKind::Season);
        assert_eq!(children[1].index, Some(0));
        assert_eq!(children[2].kind, ChildKind::Episode);
        assert_eq!(children[2].duration_ms, Some(1_800_000));
    }

    #[test]
    fn test_parse_detail_collects_alternate_guids() {
        let item = json!({
            "ratingKey": "100", "type": "show", "title": "Bluey",
            "Guid": [{"id": "imdb://tt7678620"}, {"id": "tmdb://82728"}, {"id": "tvdb://353264"}]
        });
        let detail = parse_detail(&item).unwrap();
        assert_eq!(detail.item_type, "show");
        assert_eq!(detail.alternate_guids.len(), 3);
        assert_eq!(detail.alternate_guids[2], "tvdb://353264");
    }

    #[test]
    fn test_response_container_decodes() {
        let body = r#"{"MediaContainer": {"size": 1, "Directory": [{"key": "1", "title": "TV", "type": "show"}]}}"#;
        let parsed: PlexResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.media_container.metadata.is_none());
        assert_eq!(parsed.media_container.directory.unwrap().len(), 1);
    }
}
