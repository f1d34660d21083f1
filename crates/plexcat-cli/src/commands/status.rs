use super::{last_pass_completed, load_config};
use crate::output::{Output, OutputFormat};
use chrono::{DateTime, Utc};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use comfy_table::{Attribute, Cell, Table};
use library_sync_config::{PathManager, SnapshotConfig};
use library_sync_core::{JsonSnapshotStore, SnapshotStore};
use library_sync_models::{CatalogRoot, CollectionKind, LibraryCollection};
use owo_colors::OwoColorize;
use serde_json::json;

pub async fn run_status(output: &Output) -> Result<()> {
    let paths = PathManager::default();
    // Status works without a config file; the snapshot then lives at its default path
    let snapshot_config = match load_config(&paths) {
        Ok(config) => config.snapshot,
        Err(e) => {
            tracing::debug!(error = %e, "No usable config, using the default snapshot location");
            SnapshotConfig::default()
        }
    };
    let store = JsonSnapshotStore::from_config(&snapshot_config, &paths);
    let last_pass = last_pass_completed(&paths.credentials_file());

    if !store.exists() {
        match output.format() {
            OutputFormat::Human => {
                output.warn(format!("No catalog snapshot at {}", store.path().display()));
                output.println("Run `plexcat sync` to build one.");
            }
            OutputFormat::Json | OutputFormat::JsonPretty => output.json(&json!({
                "snapshot": store.path().display().to_string(),
                "exists": false,
            })),
        }
        return Ok(());
    }

    let location = store.location();
    let root = tokio::task::spawn_blocking(move || store.load())
        .await
        .map_err(|e| eyre!("Snapshot load task failed: {}", e))?
        .map_err(|e| eyre!("Failed to read snapshot {}: {:#}", location, e))?;

    match output.format() {
        OutputFormat::Human => print_human(&root, &location, last_pass, output),
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let collections: Vec<_> = root
                .collections
                .iter()
                .map(|c| {
                    let row = CollectionRow::from_collection(c);
                    json!({
                        "key": c.key,
                        "title": c.title,
                        "kind": c.kind,
                        "shows": row.shows,
                        "seasons": row.seasons,
                        "episodes": row.episodes,
                        "movies": row.movies,
                        "refreshed_at": c.refreshed_at,
                    })
                })
                .collect();
            output.json(&json!({
                "snapshot": location,
                "exists": true,
                "last_pass_completed": last_pass,
                "counts": root.counts(),
                "collections": collections,
            }));
        }
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CollectionRow {
    shows: usize,
    seasons: usize,
    episodes: usize,
    movies: usize,
}

impl CollectionRow {
    fn from_collection(collection: &LibraryCollection) -> Self {
        let mut row = CollectionRow {
            shows: collection.shows.len(),
            movies: collection.movies.len(),
            ..Default::default()
        };
        for show in &collection.shows {
            row.seasons += show.seasons.len();
            row.episodes += show.seasons.values().map(|s| s.episodes.len()).sum::<usize>();
        }
        row
    }
}

fn print_human(root: &CatalogRoot, location: &str, last_pass: Option<DateTime<Utc>>, output: &Output) {
    output.println(format!("{} {}", "Snapshot:".bold(), location));
    let last = last_pass
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    output.println(format!("{} {}", "Last complete pass:".bold(), last));

    if root.is_empty() {
        output.warn("The catalog is empty");
        return;
    }

    let mut table = Table::new();
    table.set_header(
        ["Collection", "Kind", "Shows", "Seasons", "Episodes", "Movies", "Refreshed"]
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    for collection in &root.collections {
        let row = CollectionRow::from_collection(collection);
        let show_cell = |n: usize| {
            if collection.kind == CollectionKind::Show {
                Cell::new(n)
            } else {
                Cell::new("-")
            }
        };
        table.add_row(vec![
            Cell::new(&collection.title),
            Cell::new(collection.kind),
            show_cell(row.shows),
            show_cell(row.seasons),
            show_cell(row.episodes),
            if collection.kind == CollectionKind::Movie {
                Cell::new(row.movies)
            } else {
                Cell::new("-")
            },
            Cell::new(collection.refreshed_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    output.println(table.to_string());

    let counts = root.counts();
    output.println(format!(
        "{} collections, {} shows, {} episodes, {} movies",
        counts.collections, counts.shows, counts.episodes, counts.movies
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use library_sync_models::{EpisodeEntry, SeasonEntry, ShowEntry};

    #[test]
    fn test_collection_row_counts_nested_entries() {
        let now = Utc::now();
        let mut collection = LibraryCollection::new("1", "TV Shows", CollectionKind::Show, now);
        let mut show = ShowEntry::new("10", "Severance", now);
        let mut season = SeasonEntry::new(1, now);
        season.episodes.insert(1, EpisodeEntry::new(1, "Good News About Hell", now));
        season.episodes.insert(2, EpisodeEntry::new(2, "Half Loop", now));
        show.seasons.insert(1, season);
        collection.shows.push(show);

        let row = CollectionRow::from_collection(&collection);
        assert_eq!(
            row,
            CollectionRow {
                shows: 1,
                seasons: 1,
                episodes: 2,
                movies: 0
            }
        );
    }
}
