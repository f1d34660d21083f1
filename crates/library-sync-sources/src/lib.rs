pub mod traits;
pub mod plex;
pub mod error;

pub use traits::CatalogSource;
pub use error::SourceError;
pub use plex::PlexSource;
