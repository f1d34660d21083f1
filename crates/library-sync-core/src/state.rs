use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Where the engine currently is within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Loading,
    FetchingTopLevel,
    FanningOut,
    Reconciling,
    Evicting,
    Persisting,
    /// The last pass failed; the engine accepts a new pass.
    Failed,
}

impl EngineState {
    pub fn is_busy(&self) -> bool {
        !matches!(self, EngineState::Idle | EngineState::Failed)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EngineState::Idle => "idle",
            EngineState::Loading => "loading snapshot",
            EngineState::FetchingTopLevel => "listing collections",
            EngineState::FanningOut => "fetching shows and movies",
            EngineState::Reconciling => "reconciling",
            EngineState::Evicting => "evicting stale entries",
            EngineState::Persisting => "saving snapshot",
            EngineState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Shared handle used by the orchestrator and engine to publish state changes.
#[derive(Debug, Clone)]
pub struct StateReporter {
    tx: Arc<watch::Sender<EngineState>>,
}

impl StateReporter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(EngineState::Idle);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, state: EngineState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            tracing::trace!(from = %previous, to = %state, "Engine state changed");
        }
    }

    pub fn get(&self) -> EngineState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.tx.subscribe()
    }
}

impl Default for StateReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_without_subscribers_keeps_state() {
        let reporter = StateReporter::new();
        assert_eq!(reporter.get(), EngineState::Idle);
        reporter.set(EngineState::FanningOut);
        assert_eq!(reporter.get(), EngineState::FanningOut);
        assert!(reporter.get().is_busy());
    }

    #[tokio::test]
    async fn test_subscriber_sees_changes() {
        let reporter = StateReporter::new();
        let mut rx = reporter.subscribe();
        reporter.set(EngineState::Persisting);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), EngineState::Persisting);
    }
}
