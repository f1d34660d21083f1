use library_sync_sources::SourceError;
use std::fmt;
use thiserror::Error;

/// Errors produced while running a synchronization pass.
///
/// Only `List` (at the top level), `Snapshot`, `PassInProgress` and `Closed`
/// ever reach the caller of a pass. `TransientFetch` and `MalformedRecord` are
/// contained at the work-unit boundary and reported through `PoolOutcome`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to list {scope}: {source}")]
    List {
        scope: String,
        #[source]
        source: SourceError,
    },

    #[error("failed to fetch {key}: {source}")]
    TransientFetch {
        key: String,
        #[source]
        source: SourceError,
    },

    #[error("malformed record {key}: {reason}")]
    MalformedRecord { key: String, reason: String },

    #[error("pass was canceled")]
    Canceled,

    #[error("work unit {label} aborted: {reason}")]
    Worker { label: String, reason: String },

    #[error("snapshot store error: {0}")]
    Snapshot(String),

    #[error("a pass is already running")]
    PassInProgress,

    #[error("engine is closed")]
    Closed,

    #[error("no collection named '{0}' on the server")]
    UnknownCollection(String),
}

impl SyncError {
    pub fn list(scope: impl Into<String>, source: SourceError) -> Self {
        Self::List {
            scope: scope.into(),
            source,
        }
    }

    /// Classify a per-node source failure.
    pub fn from_source(key: impl Into<String>, source: SourceError) -> Self {
        let key = key.into();
        if source.is_malformed() {
            Self::MalformedRecord {
                key,
                reason: source.to_string(),
            }
        } else {
            Self::TransientFetch { key, source }
        }
    }

    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn snapshot(err: anyhow::Error) -> Self {
        Self::Snapshot(format!("{:#}", err))
    }

    /// Per-node failures that never abort sibling work.
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            Self::TransientFetch { .. } | Self::MalformedRecord { .. } | Self::Worker { .. }
        )
    }
}

/// Failures collected while shutting the engine down.
///
/// Every collaborator is torn down independently and the snapshot save is
/// attempted whenever the catalog was loaded, so one value can carry several
/// failures.
#[derive(Debug, Default, Error)]
#[error("shutdown finished with {} error(s){}", .failures.len(), format_failures(.failures))]
pub struct TeardownError {
    pub failures: Vec<(String, String)>,
}

impl TeardownError {
    pub fn push(&mut self, component: impl Into<String>, error: impl fmt::Display) {
        self.failures.push((component.into(), error.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// `; component: error` for each failure, in order.
    pub fn details(&self) -> String {
        format_failures(&self.failures)
    }

    pub fn into_result(self) -> Result<(), TeardownError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(component, error)| format!("; {}: {}", component, error))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_source_classifies_malformed() {
        let err = SyncError::from_source("42", SourceError::malformed("42", "no index"));
        assert!(matches!(err, SyncError::MalformedRecord { .. }));
        assert!(err.is_contained());

        let err = SyncError::from_source("42", SourceError::Timeout { url: "http://plex".into() });
        assert!(matches!(err, SyncError::TransientFetch { .. }));
    }

    #[test]
    fn test_list_error_is_not_contained() {
        let err = SyncError::list("collections", SourceError::Status { url: "u".into(), status: 500 });
        assert!(!err.is_contained());
        assert_eq!(err.to_string(), "failed to list collections: u returned HTTP 500");
    }

    #[test]
    fn test_teardown_error_aggregates() {
        let mut err = TeardownError::default();
        assert!(err.is_empty());
        err.push("webhook", "deregistration refused");
        err.push("snapshot", "disk full");
        assert_eq!(
            err.to_string(),
            "shutdown finished with 2 error(s); webhook: deregistration refused; snapshot: disk full"
        );
        assert!(err.into_result().is_err());
    }

    #[test]
    fn test_teardown_error_is_std_error() {
        let mut err = TeardownError::default();
        err.push("snapshot", "disk full");
        assert_eq!(err.details(), "; snapshot: disk full");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert_eq!(boxed.to_string(), "shutdown finished with 1 error(s); snapshot: disk full");
        assert!(TeardownError::default().into_result().is_ok());
    }
}
