use async_trait::async_trait;
use library_sync_models::{ChildDescriptor, CollectionDescriptor, DetailRecord, EntryDescriptor};
use crate::error::SourceError;

/// Access to a remote, hierarchical media catalog.
///
/// Implementations are expected to bound every call with their own timeout;
/// callers never wrap them in wall-clock limits.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    // Source metadata
    fn source_name(&self) -> &str;

    /// Top-level library collections.
    async fn list_collections(&self) -> Result<Vec<CollectionDescriptor>, SourceError>;

    /// Shows or movies directly inside a collection.
    async fn list_entries(&self, collection_key: &str) -> Result<Vec<EntryDescriptor>, SourceError>;

    /// Seasons of a show, or episodes of a season, addressed by rating key.
    async fn list_children(&self, entry_key: &str) -> Result<Vec<ChildDescriptor>, SourceError>;

    /// Full metadata for a single item.
    async fn fetch_detail(&self, key: &str) -> Result<DetailRecord, SourceError>;

    // Actions

    /// Mark an item as watched.
    async fn scrobble(&self, rating_key: &str) -> Result<(), SourceError>;

    /// Mark an item as unwatched.
    async fn unscrobble(&self, rating_key: &str) -> Result<(), SourceError>;

    /// Ask the server to rescan a collection's folders for new or removed media.
    async fn scan_collection(&self, collection: &CollectionDescriptor) -> Result<(), SourceError>;
}
