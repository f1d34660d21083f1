pub mod catalog;
pub mod descriptor;
pub mod external_ids;
pub mod movie;
pub mod show;

pub use catalog::{CatalogCounts, CatalogRoot, CollectionKind, LibraryCollection, Location};
pub use descriptor::{ChildDescriptor, ChildKind, CollectionDescriptor, DetailRecord, EntryDescriptor};
pub use external_ids::ExternalIds;
pub use movie::MovieEntry;
pub use show::{EpisodeEntry, SeasonEntry, ShowEntry};
