pub mod client;
pub mod api;

pub use client::PlexSource;
pub use api::PlexHttpClient;
