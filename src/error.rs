//! Error types surfaced by the loading pipeline.
//!
//! Loader failures never escape as panics. They come back as a `LoadError`,
//! which callers can render into the `{"error", "details"}` payload shape an
//! HTTP layer forwards to the user.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// One failed decode attempt, kept so the final error can list them all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingAttempt {
    pub encoding: String,
    pub reason: String,
}

impl fmt::Display for EncodingAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.encoding, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("data file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read the CSV file with any of the attempted encodings")]
    Decode {
        path: PathBuf,
        attempts: Vec<EncodingAttempt>,
    },

    #[error("no usable columns in {}", path.display())]
    NoUsableColumns { path: PathBuf, found: Vec<String> },
}

/// The error-shaped result handed to external callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{error}")]
pub struct ErrorPayload {
    pub error: String,
    pub details: String,
}

impl LoadError {
    /// Human-readable detail lines to go with the headline message.
    pub fn details(&self) -> String {
        match self {
            LoadError::NotFound { path } => format!("checked path: {}", path.display()),
            LoadError::Io { source, .. } => source.to_string(),
            LoadError::Decode { attempts, .. } => attempts
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
            LoadError::NoUsableColumns { found, .. } => {
                if found.is_empty() {
                    "header row is empty".to_string()
                } else {
                    format!("columns present: {}", found.join(", "))
                }
            }
        }
    }

    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            error: self.to_string(),
            details: self.details(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_payload_lists_every_attempt() {
        let err = LoadError::Decode {
            path: PathBuf::from("dashboard.csv"),
            attempts: vec![
                EncodingAttempt { encoding: "utf-8".into(), reason: "malformed byte sequence".into() },
                EncodingAttempt { encoding: "shift_jis".into(), reason: "malformed byte sequence".into() },
            ],
        };
        let payload = err.payload();
        assert!(payload.error.contains("encodings"));
        assert_eq!(payload.details.lines().count(), 2);
        assert!(payload.details.starts_with("utf-8: "));
    }

    #[test]
    fn test_payload_serializes_as_error_and_details() {
        let err = LoadError::NotFound { path: PathBuf::from("/nowhere/dashboard.csv") };
        let json = serde_json::to_value(err.payload()).unwrap();
        assert!(json["error"].as_str().unwrap().contains("/nowhere/dashboard.csv"));
        assert!(json.get("details").is_some());
    }
}
