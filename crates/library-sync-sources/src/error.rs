use thiserror::Error;

/// Failure talking to a remote catalog source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("malformed record {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("invalid source configuration: {0}")]
    Config(String),
}

impl SourceError {
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Translate a reqwest failure for `url` into the matching variant.
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { url: url.to_string() }
        } else if err.is_decode() {
            Self::Decode {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// The response arrived but its shape was wrong.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Malformed { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(SourceError::malformed("42", "missing index").is_malformed());
        assert!(SourceError::Decode { url: "u".into(), reason: "eof".into() }.is_malformed());
        assert!(!SourceError::Status { url: "u".into(), status: 500 }.is_malformed());
        assert!(SourceError::Timeout { url: "u".into() }.is_timeout());
    }

    #[test]
    fn test_display_includes_context() {
        let err = SourceError::Status {
            url: "http://plex/library/sections".into(),
            status: 401,
        };
        assert_eq!(err.to_string(), "http://plex/library/sections returned HTTP 401");
    }
}
