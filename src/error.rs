//! Error types for sector-sync
//!
//! This module provides the error taxonomy for the agent:
//! - Structural transfer failures ([`TransferError`]) that surface to the pipeline step
//! - Collaborator failures (declare, outcome report, discovery)
//! - Machine-readable error codes for logs and outcome reports

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{SectorFileKind, SectorId};

/// Result type alias for sector-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sector-sync
///
/// Each variant carries enough context to diagnose which sector, file or endpoint
/// was involved without consulting the logs.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "transfer.part_size")
        key: Option<String>,
    },

    /// Structural transfer error (length discovery, status, body length)
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Cache archive could not be unpacked
    #[error("unpack failed for {archive}: {reason}")]
    Unpack {
        /// The archive that failed to unpack
        archive: PathBuf,
        /// The reason unpacking failed
        reason: String,
    },

    /// The storage-management service rejected or could not confirm a declaration
    #[error("declare failed for sector {sector_id} ({kind}): {reason}")]
    Declare {
        /// Sector being declared
        sector_id: SectorId,
        /// File kind being declared
        kind: SectorFileKind,
        /// The reason the declaration failed
        reason: String,
    },

    /// The platform rejected an outcome report or discovery request
    #[error("platform error: {0}")]
    Platform(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation observed the cancellation signal
    #[error("operation cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Transfer errors raised by the chunk fetcher
#[derive(Debug, Error)]
pub enum TransferError {
    /// The server did not answer the length probe with a usable `Content-Range`
    #[error("range requests not supported by {url}: {reason}")]
    RangeUnsupported {
        /// Source URL that was probed
        url: String,
        /// What was wrong with the response
        reason: String,
    },

    /// The server answered with a non-2xx status
    #[error("{url} returned HTTP {status}: {body}")]
    HttpStatus {
        /// Source URL
        url: String,
        /// HTTP status code
        status: u16,
        /// Response body (truncated), useful for diagnosing platform errors
        body: String,
    },

    /// A ranged response body did not match the requested span
    #[error("expected {expected} bytes for range {start}-{end}, got {received}")]
    LengthMismatch {
        /// First byte of the requested range
        start: u64,
        /// Last byte (inclusive) of the requested range
        end: u64,
        /// Number of bytes the range should contain
        expected: u64,
        /// Number of bytes actually received
        received: u64,
    },
}

impl Error {
    /// Machine-readable error code
    ///
    /// Used as a stable token in logs, events and outcome reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Transfer(TransferError::RangeUnsupported { .. }) => "range_unsupported",
            Error::Transfer(TransferError::HttpStatus { .. }) => "http_status",
            Error::Transfer(TransferError::LengthMismatch { .. }) => "length_mismatch",
            Error::Unpack { .. } => "unpack_failed",
            Error::Declare { .. } => "declare_failed",
            Error::Platform(_) => "platform_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Cancelled => "cancelled",
            Error::Other(_) => "internal_error",
        }
    }

    /// Build a configuration error for a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable_per_variant() {
        let cases: Vec<(Error, &str)> = vec![
            (Error::config("transfer.part_size", "must be > 0"), "config_error"),
            (
                Error::Transfer(TransferError::RangeUnsupported {
                    url: "http://x".into(),
                    reason: "missing header".into(),
                }),
                "range_unsupported",
            ),
            (
                Error::Transfer(TransferError::HttpStatus {
                    url: "http://x".into(),
                    status: 503,
                    body: String::new(),
                }),
                "http_status",
            ),
            (
                Error::Unpack {
                    archive: PathBuf::from("/tmp/a"),
                    reason: "truncated".into(),
                },
                "unpack_failed",
            ),
            (
                Error::Declare {
                    sector_id: SectorId(7),
                    kind: SectorFileKind::Cache,
                    reason: "not found".into(),
                },
                "declare_failed",
            ),
            (Error::Platform("bad msg".into()), "platform_error"),
            (Error::Cancelled, "cancelled"),
            (Error::Other("boom".into()), "internal_error"),
        ];

        for (err, code) in cases {
            assert_eq!(err.error_code(), code, "wrong code for {err}");
        }
    }

    #[test]
    fn declare_error_message_names_sector_and_kind() {
        let err = Error::Declare {
            sector_id: SectorId(21),
            kind: SectorFileKind::Sealed,
            reason: "declared but not found".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("21"), "message should name the sector: {msg}");
        assert!(msg.contains("sealed"), "message should name the kind: {msg}");
    }

    #[test]
    fn config_helper_records_key() {
        match Error::config("miner.id", "must not be empty") {
            Error::Config { key, message } => {
                assert_eq!(key.as_deref(), Some("miner.id"));
                assert_eq!(message, "must not be empty");
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }
}
