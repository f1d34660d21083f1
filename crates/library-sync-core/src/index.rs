//! Rating-key index over the catalog tree.
//!
//! The tree owns every node through its parent; the index only records the
//! path to each node so lookups do not need to scan the whole tree.

use library_sync_models::{CatalogRoot, EpisodeEntry, MovieEntry, SeasonEntry, ShowEntry};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Location of a node inside the tree, expressed with each level's key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum NodePath {
    Collection {
        collection: String,
    },
    Show {
        collection: String,
        show: String,
    },
    Season {
        collection: String,
        show: String,
        season: u32,
    },
    Episode {
        collection: String,
        show: String,
        season: u32,
        episode: u32,
    },
    Movie {
        collection: String,
        movie: String,
    },
}

impl NodePath {
    pub fn collection(title: impl Into<String>) -> Self {
        NodePath::Collection { collection: title.into() }
    }

    pub fn show(collection: impl Into<String>, show: impl Into<String>) -> Self {
        NodePath::Show {
            collection: collection.into(),
            show: show.into(),
        }
    }

    pub fn season(collection: impl Into<String>, show: impl Into<String>, season: u32) -> Self {
        NodePath::Season {
            collection: collection.into(),
            show: show.into(),
            season,
        }
    }

    pub fn collection_title(&self) -> &str {
        match self {
            NodePath::Collection { collection }
            | NodePath::Show { collection, .. }
            | NodePath::Season { collection, .. }
            | NodePath::Episode { collection, .. }
            | NodePath::Movie { collection, .. } => collection,
        }
    }

    /// The enclosing show for season and episode paths.
    pub fn show_path(&self) -> Option<NodePath> {
        match self {
            NodePath::Show { .. } => Some(self.clone()),
            NodePath::Season { collection, show, .. } | NodePath::Episode { collection, show, .. } => {
                Some(NodePath::show(collection.clone(), show.clone()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodePath::Collection { collection } => write!(f, "{}", collection),
            NodePath::Show { collection, show } => write!(f, "{}/{}", collection, show),
            NodePath::Season { collection, show, season } => write!(f, "{}/{}/S{:02}", collection, show, season),
            NodePath::Episode {
                collection,
                show,
                season,
                episode,
            } => write!(f, "{}/{}/S{:02}E{:02}", collection, show, season, episode),
            NodePath::Movie { collection, movie } => write!(f, "{}/{}", collection, movie),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    by_rating_key: HashMap<String, NodePath>,
    by_tvdb: HashMap<u32, NodePath>,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(root: &CatalogRoot) -> Self {
        let mut index = Self::new();
        for collection in &root.collections {
            let title = &collection.title;
            for movie in &collection.movies {
                index.record(
                    &movie.rating_key,
                    movie.ids.tvdb_id,
                    NodePath::Movie {
                        collection: title.clone(),
                        movie: movie.rating_key.clone(),
                    },
                );
            }
            for show in &collection.shows {
                let show_key = show.key().to_string();
                index.record(&show.rating_key, show.ids.tvdb_id, NodePath::show(title.clone(), show_key.clone()));
                for (season_number, season) in &show.seasons {
                    index.record(
                        &season.rating_key,
                        None,
                        NodePath::season(title.clone(), show_key.clone(), *season_number),
                    );
                    for (episode_number, episode) in &season.episodes {
                        index.record(
                            &episode.rating_key,
                            episode.ids.tvdb_id,
                            NodePath::Episode {
                                collection: title.clone(),
                                show: show_key.clone(),
                                season: *season_number,
                                episode: *episode_number,
                            },
                        );
                    }
                }
            }
        }
        index
    }

    /// Register a node. Nodes without a rating key are reachable only through the tree.
    pub fn record(&mut self, rating_key: &str, tvdb_id: Option<u32>, path: NodePath) {
        if let Some(tvdb) = tvdb_id {
            self.by_tvdb.entry(tvdb).or_insert_with(|| path.clone());
        }
        if !rating_key.is_empty() {
            self.by_rating_key.insert(rating_key.to_string(), path);
        }
    }

    pub fn len(&self) -> usize {
        self.by_rating_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rating_key.is_empty()
    }

    pub fn path(&self, rating_key: &str) -> Option<&NodePath> {
        self.by_rating_key.get(rating_key)
    }

    pub fn path_by_tvdb(&self, tvdb_id: u32) -> Option<&NodePath> {
        self.by_tvdb.get(&tvdb_id)
    }

    pub fn find_show<'a>(&self, root: &'a CatalogRoot, rating_key: &str) -> Option<&'a ShowEntry> {
        match self.path(rating_key)? {
            NodePath::Show { collection, show } => root.collection(collection)?.show(show),
            _ => None,
        }
    }

    pub fn find_season<'a>(&self, root: &'a CatalogRoot, rating_key: &str) -> Option<(&'a ShowEntry, &'a SeasonEntry)> {
        match self.path(rating_key)? {
            NodePath::Season { collection, show, season } => {
                let show = root.collection(collection)?.show(show)?;
                Some((show, show.seasons.get(season)?))
            }
            _ => None,
        }
    }

    pub fn find_episode<'a>(
        &self,
        root: &'a CatalogRoot,
        rating_key: &str,
    ) -> Option<(&'a ShowEntry, &'a SeasonEntry, &'a EpisodeEntry)> {
        resolve_episode(root, self.path(rating_key)?)
    }

    pub fn find_movie<'a>(&self, root: &'a CatalogRoot, rating_key: &str) -> Option<&'a MovieEntry> {
        match self.path(rating_key)? {
            NodePath::Movie { collection, movie } => root.collection(collection)?.movie(movie),
            _ => None,
        }
    }

    /// Episode or show carrying the given TVDB id.
    pub fn find_by_tvdb<'a>(
        &self,
        root: &'a CatalogRoot,
        tvdb_id: u32,
    ) -> Option<(&'a ShowEntry, Option<&'a EpisodeEntry>)> {
        match self.path_by_tvdb(tvdb_id)? {
            NodePath::Show { collection, show } => Some((root.collection(collection)?.show(show)?, None)),
            path @ NodePath::Episode { .. } => {
                let (show, _, episode) = resolve_episode(root, path)?;
                Some((show, Some(episode)))
            }
            _ => None,
        }
    }
}

fn resolve_episode<'a>(
    root: &'a CatalogRoot,
    path: &NodePath,
) -> Option<(&'a ShowEntry, &'a SeasonEntry, &'a EpisodeEntry)> {
    match path {
        NodePath::Episode {
            collection,
            show,
            season,
            episode,
        } => {
            let show = root.collection(collection)?.show(show)?;
            let season = show.seasons.get(season)?;
            Some((show, season, season.episodes.get(episode)?))
        }
        _ => None,
    }
}
