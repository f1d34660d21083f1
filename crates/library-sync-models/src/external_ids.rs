use serde::{Deserialize, Serialize};

/// Identifiers issued by metadata providers other than the media server.
///
/// The server reports these as alternate GUIDs such as `tvdb://81189`,
/// `tmdb://1396` or `imdb://tt0903747`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalIds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvdb_id: Option<u32>,
}

impl ExternalIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse alternate GUIDs. Unknown providers are ignored and a numeric id
    /// that does not parse leaves the field unset.
    pub fn from_guids<S: AsRef<str>>(guids: &[S]) -> Self {
        let mut ids = Self::new();
        for guid in guids {
            let guid = guid.as_ref();
            let Some((provider, value)) = guid.split_once("://") else {
                continue;
            };
            match provider {
                "imdb" if ids.imdb_id.is_none() && !value.is_empty() => {
                    ids.imdb_id = Some(value.to_string());
                }
                "tmdb" if ids.tmdb_id.is_none() => {
                    ids.tmdb_id = value.parse().ok();
                }
                "tvdb" if ids.tvdb_id.is_none() => {
                    ids.tvdb_id = value.parse().ok();
                }
                _ => {}
            }
        }
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.imdb_id.is_none() && self.tmdb_id.is_none() && self.tvdb_id.is_none()
    }

    /// Best available identifier as a prefixed string (imdb first).
    pub fn primary_id(&self) -> Option<String> {
        self.imdb_id
            .clone()
            .or_else(|| self.tmdb_id.map(|id| format!("tmdb:{}", id)))
            .or_else(|| self.tvdb_id.map(|id| format!("tvdb:{}", id)))
    }

    /// Fill in ids missing from `self` with those from `other`.
    /// Existing values are not overwritten.
    pub fn merge(&mut self, other: &ExternalIds) {
        if self.imdb_id.is_none() {
            self.imdb_id = other.imdb_id.clone();
        }
        if self.tmdb_id.is_none() {
            self.tmdb_id = other.tmdb_id;
        }
        if self.tvdb_id.is_none() {
            self.tvdb_id = other.tvdb_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_guids_parses_known_providers() {
        let ids = ExternalIds::from_guids(&["imdb://tt0903747", "tmdb://1396", "tvdb://81189"]);
        assert_eq!(ids.imdb_id.as_deref(), Some("tt0903747"));
        assert_eq!(ids.tmdb_id, Some(1396));
        assert_eq!(ids.tvdb_id, Some(81189));
    }

    #[test]
    fn test_from_guids_ignores_garbage() {
        let ids = ExternalIds::from_guids(&["plex://show/5d9c0", "tvdb://notanumber", "nonsense"]);
        assert!(ids.is_empty());
        assert_eq!(ids.primary_id(), None);
    }

    #[test]
    fn test_merge_keeps_existing_values() {
        let mut ids = ExternalIds { tvdb_id: Some(1), ..ExternalIds::default() };
        ids.merge(&ExternalIds { tvdb_id: Some(2), tmdb_id: Some(3), imdb_id: None });
        assert_eq!(ids.tvdb_id, Some(1));
        assert_eq!(ids.tmdb_id, Some(3));
        assert_eq!(ids.primary_id().as_deref(), Some("tmdb:3"));
    }
}
