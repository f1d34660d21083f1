use indicatif::{ProgressBar, ProgressStyle};
use library_sync_core::EngineState;
use std::io::IsTerminal;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spinner that follows the engine state while a pass runs.
///
/// Without a terminal the spinner stays hidden and each state change is logged
/// instead.
pub struct PassProgress {
    spinner: ProgressBar,
    watcher: JoinHandle<()>,
}

impl PassProgress {
    pub fn start(mut states: watch::Receiver<EngineState>, show_spinner: bool) -> Self {
        let interactive = show_spinner && is_interactive();
        let spinner = if interactive {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            );
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        } else {
            tracing::info!(
                operation = "ui_init",
                mode = "non_interactive",
                "Running in non-interactive mode - spinner disabled, using structured logging"
            );
            ProgressBar::hidden()
        };
        spinner.set_message(states.borrow().to_string());

        let bar = spinner.clone();
        let watcher = tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                if interactive {
                    bar.set_message(state.to_string());
                } else {
                    tracing::info!(operation = "progress", state = %state, "Pass progress");
                }
            }
        });

        Self { spinner, watcher }
    }

    pub fn finish(self) {
        self.watcher.abort();
        self.spinner.finish_and_clear();
    }
}

pub fn is_interactive() -> bool {
    std::io::stdout().is_terminal() && std::io::stderr().is_terminal()
}
