use super::{engine_builder, load_config, record_pass_completion};
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use library_sync_config::PathManager;
use library_sync_core::{CatalogEngine, SyncError};
use std::path::Path;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

pub async fn run_daemon(schedule: Option<String>, no_startup_sync: bool, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    let config = load_config(&paths)?;
    let mut scheduler_config = config.scheduler_or_default();
    if let Some(schedule) = schedule {
        scheduler_config.schedule = schedule;
    }
    if no_startup_sync {
        scheduler_config.run_on_startup = false;
    }

    let engine = engine_builder(&config, &paths)?.build();
    let cached = engine
        .open()
        .await
        .map_err(|e| eyre!("Failed to load cached catalog from {}: {}", engine.snapshot_location(), e))?;
    info!(
        operation = "daemon_start",
        collections = cached.collections,
        shows = cached.shows,
        movies = cached.movies,
        "Cached catalog loaded"
    );

    let credentials_file = paths.credentials_file();
    let mut scheduler = JobScheduler::new().await?;
    let job_engine = engine.clone();
    let job_credentials = credentials_file.clone();
    let job = Job::new_async(scheduler_config.schedule.as_str(), move |_uuid, _lock| {
        let engine = job_engine.clone();
        let credentials_file = job_credentials.clone();
        Box::pin(async move {
            run_scheduled_pass(&engine, &credentials_file, "schedule").await;
        })
    })
    .map_err(|e| eyre!("Invalid schedule '{}': {}", scheduler_config.schedule, e))?;
    scheduler.add(job).await?;
    scheduler.start().await?;

    info!(
        operation = "scheduler_started",
        schedule = %scheduler_config.schedule,
        run_on_startup = scheduler_config.run_on_startup,
        "Scheduler started"
    );
    output.success(format!(
        "plexcat daemon running (schedule '{}'). Press Ctrl-C to stop.",
        scheduler_config.schedule
    ));

    if scheduler_config.run_on_startup {
        let engine = engine.clone();
        let credentials_file = credentials_file.clone();
        tokio::spawn(async move {
            run_scheduled_pass(&engine, &credentials_file, "startup").await;
        });
    }

    shutdown_signal().await;
    info!(operation = "daemon_stop", "Shutdown requested");
    output.info("Stopping, waiting for the running pass to finish...");

    if let Err(e) = scheduler.shutdown().await {
        warn!(operation = "daemon_stop", error = %e, "Scheduler did not shut down cleanly");
    }
    engine
        .close()
        .await
        .map_err(|e| eyre!("Shutdown was incomplete: {}", e))?;
    output.success("Catalog saved, daemon stopped");
    Ok(())
}

/// Run one pass. A pass that is still running when the next trigger fires is
/// left alone.
async fn run_scheduled_pass(engine: &CatalogEngine, credentials_file: &Path, trigger: &str) {
    info!(operation = "scheduled_pass_start", trigger, "Starting pass");
    match engine.run_pass().await {
        Ok(summary) => {
            info!(
                operation = "scheduled_pass_complete",
                trigger,
                canceled = summary.canceled,
                shows = summary.counts.shows,
                episodes = summary.counts.episodes,
                movies = summary.counts.movies,
                evicted = summary.eviction.total(),
                failed_units = summary.failed_units.len(),
                duration_ms = (summary.finished_at - summary.started_at).num_milliseconds(),
                "Pass finished"
            );
            for failure in summary.list_failures.iter().chain(&summary.failed_units) {
                warn!(operation = "scheduled_pass_complete", trigger, failure = %failure, "Part of the catalog was not refreshed");
            }
            if !summary.canceled {
                record_pass_completion(credentials_file, summary.finished_at);
            }
        }
        Err(SyncError::PassInProgress) => {
            warn!(operation = "scheduled_pass_skipped", trigger, "Previous pass still running, skipping this one");
        }
        Err(SyncError::Closed) => {
            debug!(operation = "scheduled_pass_skipped", trigger, "Engine is closing");
        }
        Err(e) => {
            error!(operation = "scheduled_pass_error", trigger, error = %e, "Pass failed");
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
                return;
            }
            Err(e) => warn!(error = %e, "Could not listen for SIGTERM, only Ctrl-C will stop the daemon"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
    }
}
