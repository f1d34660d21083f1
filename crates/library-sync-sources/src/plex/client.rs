use async_trait::async_trait;
use library_sync_config::ServerConfig;
use library_sync_models::{ChildDescriptor, CollectionDescriptor, DetailRecord, EntryDescriptor};
use std::time::Duration;
use tracing::debug;
use crate::error::SourceError;
use crate::plex::api::PlexHttpClient;
use crate::traits::CatalogSource;

/// Catalog source backed by a Plex Media Server.
pub struct PlexSource {
    http: PlexHttpClient,
}

impl PlexSource {
    pub fn new(server_url: &str, token: &str, timeout: Duration) -> Result<Self, SourceError> {
        if server_url.trim().is_empty() {
            return Err(SourceError::Config("server URL is required".to_string()));
        }
        if token.trim().is_empty() {
            return Err(SourceError::Config("Plex token is required".to_string()));
        }
        Ok(Self {
            http: PlexHttpClient::new(server_url, token, timeout)?,
        })
    }

    pub fn from_config(server: &ServerConfig, token: &str) -> Result<Self, SourceError> {
        Self::new(&server.url, token, Duration::from_secs(server.request_timeout_secs))
    }

    pub fn server_url(&self) -> &str {
        self.http.base_url()
    }
}

#[async_trait]
impl CatalogSource for PlexSource {
    fn source_name(&self) -> &str {
        "plex"
    }

    async fn list_collections(&self) -> Result<Vec<CollectionDescriptor>, SourceError> {
        let sections = self.http.get_sections().await?;
        debug!(count = sections.len(), "Plex: listed library sections");
        Ok(sections)
    }

    async fn list_entries(&self, collection_key: &str) -> Result<Vec<EntryDescriptor>, SourceError> {
        let entries = self.http.get_section_items(collection_key).await?;
        debug!(section = %collection_key, count = entries.len(), "Plex: listed section items");
        Ok(entries)
    }

    async fn list_children(&self, entry_key: &str) -> Result<Vec<ChildDescriptor>, SourceError> {
        self.http.get_children(entry_key).await
    }

    async fn fetch_detail(&self, key: &str) -> Result<DetailRecord, SourceError> {
        if key.is_empty() {
            return Err(SourceError::malformed(key, "no rating key provided"));
        }
        self.http.get_metadata(key).await
    }

    async fn scrobble(&self, rating_key: &str) -> Result<(), SourceError> {
        if rating_key.is_empty() {
            return Err(SourceError::malformed(rating_key, "no rating key provided"));
        }
        self.http.scrobble(rating_key).await?;
        debug!(rating_key = %rating_key, "Plex: marked watched");
        Ok(())
    }

    async fn unscrobble(&self, rating_key: &str) -> Result<(), SourceError> {
        if rating_key.is_empty() {
            return Err(SourceError::malformed(rating_key, "no rating key provided"));
        }
        self.http.unscrobble(rating_key).await?;
        debug!(rating_key = %rating_key, "Plex: marked unwatched");
        Ok(())
    }

    async fn scan_collection(&self, collection: &CollectionDescriptor) -> Result<(), SourceError> {
        if collection.locations.is_empty() {
            return self.http.refresh_section(&collection.key, None).await;
        }
        for location in &collection.locations {
            self.http.refresh_section(&collection.key, Some(&location.path)).await?;
        }
        debug!(section = %collection.key, locations = collection.locations.len(), "Plex: scan requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use library_sync_models::{CollectionKind, Location};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Serves `count` requests with `status_line` and reports each request line.
    fn local_server(status_line: &'static str, count: usize) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for _ in 0..count {
                let (mut stream, _) = listener.accept().unwrap();
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut chunk).unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&chunk[..n]);
                }
                let response = format!("{}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status_line);
                stream.write_all(response.as_bytes()).unwrap();
                let text = String::from_utf8_lossy(&request).to_string();
                tx.send(text.lines().next().unwrap_or_default().to_string()).unwrap();
            }
        });
        (base, rx)
    }

    #[test]
    fn test_new_requires_url_and_token() {
        assert!(PlexSource::new("", "token", Duration::from_secs(3)).is_err());
        assert!(PlexSource::new("http://plex.local:32400", "  ", Duration::from_secs(3)).is_err());
    }

    #[test]
    fn test_from_config_trims_trailing_slash() {
        let server = ServerConfig {
            url: "http://plex.local:32400/".to_string(),
            request_timeout_secs: 5,
        };
        let source = PlexSource::from_config(&server, "abc").unwrap();
        assert_eq!(source.server_url(), "http://plex.local:32400");
        assert_eq!(source.source_name(), "plex");
    }

    #[tokio::test]
    async fn test_fetch_detail_rejects_empty_key() {
        let source = PlexSource::new("http://127.0.0.1:9", "abc", Duration::from_millis(50)).unwrap();
        let err = source.fetch_detail("").await.unwrap_err();
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn test_scrobble_and_unscrobble_hit_library_endpoints() {
        let (base, requests) = local_server("HTTP/1.1 200 OK", 2);
        let source = PlexSource::new(&base, "abc", Duration::from_secs(5)).unwrap();

        source.scrobble("4242").await.unwrap();
        source.unscrobble("4242").await.unwrap();

        let watched = requests.recv().unwrap();
        assert!(watched.starts_with("GET /:/scrobble?"));
        assert!(watched.contains("key=4242"));
        assert!(watched.contains("identifier=com.plexapp.plugins.library"));
        assert!(requests.recv().unwrap().starts_with("GET /:/unscrobble?"));
    }

    #[tokio::test]
    async fn test_scan_refreshes_each_location() {
        let (base, requests) = local_server("HTTP/1.1 200 OK", 2);
        let source = PlexSource::new(&base, "abc", Duration::from_secs(5)).unwrap();
        let mut tv = CollectionDescriptor::new("1", "TV", CollectionKind::Show);
        tv.locations = vec![
            Location { id: 1, path: "/data/tv".into() },
            Location { id: 2, path: "/data/anime".into() },
        ];

        source.scan_collection(&tv).await.unwrap();

        assert!(requests.recv().unwrap().contains("/library/sections/1/refresh?path=%2Fdata%2Ftv"));
        assert!(requests.recv().unwrap().contains("path=%2Fdata%2Fanime"));
    }

    #[tokio::test]
    async fn test_rejected_action_is_status_error() {
        let (base, _requests) = local_server("HTTP/1.1 401 Unauthorized", 1);
        let source = PlexSource::new(&base, "abc", Duration::from_secs(5)).unwrap();

        let err = source.scrobble("4242").await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 401, .. }));
        assert!(source.unscrobble("").await.unwrap_err().is_malformed());
    }
}
