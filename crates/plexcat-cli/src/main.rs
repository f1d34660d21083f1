use clap::{ArgAction, Parser, Subcommand};
use commands::{actions, clear, daemon, status, sync};
use library_sync_config::PathManager;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "plexcat")]
#[command(about = "plexcat - Keep a local catalog of your Plex libraries")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one catalog pass against the server
    #[command(long_about = "Load the cached catalog, list every library on the Plex server, merge the result into the cache, evict what is gone and write the snapshot back.")]
    Sync,
    /// Run passes on a schedule until interrupted
    #[command(long_about = "Run plexcat in the foreground and refresh the catalog according to the configured cron schedule. Press Ctrl-C to stop; the running pass is canceled and the snapshot is written before exit.")]
    Daemon {
        /// Cron schedule expression with seconds (e.g. '0 0 */6 * * *')
        #[arg(long, value_name = "SCHEDULE")]
        schedule: Option<String>,

        /// Skip the pass on startup
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_sync: bool,

        /// Write logs to the daily-rotated log file instead of stderr
        #[arg(long, action = ArgAction::SetTrue)]
        log_to_file: bool,
    },
    /// Show what the cached catalog contains
    Status,
    /// Mark an item as watched on the server
    Watched {
        /// Rating key of the show, season, episode or movie
        rating_key: String,
    },
    /// Mark an item as unwatched on the server
    Unwatched {
        /// Rating key of the show, season, episode or movie
        rating_key: String,
    },
    /// Ask the server to rescan a library's folders
    #[command(long_about = "Ask the Plex server to rescan every folder of a library for new or removed media. The library is matched by title or section key. Run `plexcat sync` afterwards to pick up the changes.")]
    Scan {
        /// Library title or section key
        collection: String,
    },
    /// Delete cached data
    #[command(long_about = "Delete the catalog snapshot. Use --credentials to also remove the stored token and pass timestamps, or --all for both.")]
    Clear {
        /// Clear snapshot and credentials
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,

        /// Clear stored credentials
        #[arg(long, action = ArgAction::SetTrue)]
        credentials: bool,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Daemon { log_to_file: true, .. } => Some(PathManager::default().daemon_log_file()),
        _ => None,
    };
    logging::init_logging_with_file(cli.verbose, cli.quiet, log_file)
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Sync => sync::run_sync(&output).await,
        Commands::Daemon {
            schedule,
            no_startup_sync,
            ..
        } => daemon::run_daemon(schedule, no_startup_sync, &output).await,
        Commands::Status => status::run_status(&output).await,
        Commands::Watched { rating_key } => actions::run_set_watched(&rating_key, true, &output).await,
        Commands::Unwatched { rating_key } => actions::run_set_watched(&rating_key, false, &output).await,
        Commands::Scan { collection } => actions::run_scan(&collection, &output).await,
        Commands::Clear { all, credentials } => clear::run_clear(all, credentials, &output).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_commands_parse() {
        let cli = Cli::try_parse_from(["plexcat", "watched", "4242"]).unwrap();
        assert!(matches!(cli.command, Commands::Watched { ref rating_key } if rating_key == "4242"));

        let cli = Cli::try_parse_from(["plexcat", "--output", "json", "scan", "TV Shows"]).unwrap();
        assert!(matches!(cli.command, Commands::Scan { ref collection } if collection == "TV Shows"));

        assert!(Cli::try_parse_from(["plexcat", "unwatched"]).is_err());
    }
}
