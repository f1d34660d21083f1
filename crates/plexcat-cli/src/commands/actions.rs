use super::{engine_builder, load_config};
use crate::output::{Output, OutputFormat};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use library_sync_config::PathManager;
use serde_json::json;

/// Mark an item watched or unwatched on the server and in the cached catalog.
pub async fn run_set_watched(rating_key: &str, watched: bool, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let config = load_config(&paths)?;
    let engine = engine_builder(&config, &paths)?.build();
    engine
        .open()
        .await
        .map_err(|e| eyre!("Failed to load cached catalog from {}: {}", engine.snapshot_location(), e))?;

    let result = engine.set_watched(rating_key, watched).await;
    let closed = engine.close().await;
    let cached = result.map_err(|e| eyre!("Server rejected the change: {}", e))?;

    match output.format() {
        OutputFormat::Human => output.success(watched_message(rating_key, watched, cached)),
        OutputFormat::Json | OutputFormat::JsonPretty => output.json(&json!({
            "rating_key": rating_key,
            "watched": watched,
            "cached": cached,
        })),
    }
    closed.map_err(|e| eyre!("Shutdown was incomplete: {}", e))
}

/// Ask the server to rescan a collection's folders.
pub async fn run_scan(collection: &str, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let config = load_config(&paths)?;
    let engine = engine_builder(&config, &paths)?.build();

    let descriptor = engine
        .scan_collection(collection)
        .await
        .map_err(|e| eyre!("Scan failed: {}", e))?;

    match output.format() {
        OutputFormat::Human => {
            output.success(format!("Scan requested for '{}'", descriptor.title));
            for location in &descriptor.locations {
                output.info(format!("  {}", location.path));
            }
        }
        OutputFormat::Json | OutputFormat::JsonPretty => output.json(&json!({
            "collection": descriptor.title,
            "key": descriptor.key,
            "locations": descriptor.locations.iter().map(|l| l.path.as_str()).collect::<Vec<_>>(),
        })),
    }
    Ok(())
}

fn watched_message(rating_key: &str, watched: bool, cached: bool) -> String {
    let state = if watched { "watched" } else { "unwatched" };
    if cached {
        format!("Marked {} as {}", rating_key, state)
    } else {
        format!("Marked {} as {} (not in the local catalog yet)", rating_key, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watched_message_mentions_uncached_items() {
        assert_eq!(watched_message("200", true, true), "Marked 200 as watched");
        assert!(watched_message("999", false, false).contains("not in the local catalog"));
    }
}
