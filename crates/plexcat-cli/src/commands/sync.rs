use super::sync_ui::PassProgress;
use super::{engine_builder, load_config, record_pass_completion};
use crate::output::{Output, OutputFormat};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use library_sync_config::PathManager;
use library_sync_core::PassSummary;
use serde_json::json;

pub async fn run_sync(output: &Output) -> Result<()> {
    tracing::debug!("Sync command started");

    let paths = PathManager::default();
    let config = load_config(&paths)?;
    // `close` writes the final snapshot, so a one-shot pass skips the extra save
    let engine = engine_builder(&config, &paths)?.with_persist_after_pass(false).build();

    let progress = PassProgress::start(engine.subscribe(), output.is_human() && !output.is_quiet());
    let cached = match engine.open().await {
        Ok(counts) => counts,
        Err(e) => {
            progress.finish();
            return Err(eyre!("Failed to load cached catalog from {}: {}", engine.snapshot_location(), e));
        }
    };
    tracing::debug!(collections = cached.collections, shows = cached.shows, "Cached catalog loaded");

    let handle = engine.start_pass().map_err(|e| eyre!("Could not start pass: {}", e))?;
    let cancel = handle.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, canceling pass");
            cancel.cancel();
        }
    });

    let result = handle.wait().await;
    interrupt.abort();
    progress.finish();

    let closed = engine.close().await;
    let summary = result.map_err(|e| eyre!("Pass failed: {}", e))?;
    if !summary.canceled {
        record_pass_completion(&paths.credentials_file(), summary.finished_at);
    }
    report(&summary, output)?;

    closed.map_err(|e| eyre!("Catalog updated but shutdown was incomplete: {}", e))
}

fn report(summary: &PassSummary, output: &Output) -> Result<()> {
    match output.format() {
        OutputFormat::Human => {
            let counts = summary.counts;
            let elapsed = summary.finished_at - summary.started_at;
            let message = format!(
                "Catalog updated: {} collections, {} shows, {} episodes, {} movies in {:.1}s",
                counts.collections,
                counts.shows,
                counts.episodes,
                counts.movies,
                elapsed.num_milliseconds() as f64 / 1000.0
            );
            if summary.canceled {
                output.warn(format!("Pass canceled. {}", message));
            } else {
                output.success(message);
            }
            if summary.eviction.total() > 0 {
                output.info(format!(
                    "Removed {} stale entries ({} shows, {} episodes, {} movies)",
                    summary.eviction.total(),
                    summary.eviction.shows,
                    summary.eviction.episodes,
                    summary.eviction.movies
                ));
            }
            for failure in &summary.list_failures {
                output.error(failure);
            }
            for failure in &summary.failed_units {
                output.warn(failure);
            }
        }
        OutputFormat::Json | OutputFormat::JsonPretty => {
            output.json(&json!({
                "success": summary.is_clean(),
                "summary": serde_json::to_value(summary)?,
            }));
        }
    }
    Ok(())
}
