//! Error types for the simulated detector.
//!
//! `PiperError` is the crate-level error. Two narrower families sit beside it:
//!
//! - **`SinkError`**: an output channel refused a record (consumer gone or
//!   bounded channel full). Producers treat these as
//!   transient: the tick is skipped and the next tick tries again.
//! - **`IngestError`**: an inbound frame could not be persisted. Tagged with an
//!   [`IngestErrorKind`] so the ingest path can log it precisely and move on
//!   to the next frame instead of propagating it.
//!
//! By using `#[from]`, `PiperError` can be created from the underlying error
//! types with the `?` operator.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Sink Errors
// =============================================================================

/// Failure to push a record into an output sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The consuming end of the channel has been dropped.
    #[error("sink '{sink}' is closed")]
    Closed {
        /// Sink name
        sink: String,
    },

    /// A bounded channel is at capacity.
    #[error("sink '{sink}' is full")]
    Full {
        /// Sink name
        sink: String,
    },
}

impl SinkError {
    /// Name of the sink that rejected the record.
    pub fn sink(&self) -> &str {
        match self {
            SinkError::Closed { sink } | SinkError::Full { sink } => sink,
        }
    }
}

// =============================================================================
// Ingest Errors
// =============================================================================

/// Stage of the ingest path that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestErrorKind {
    /// Train id or image array missing or of the wrong shape.
    MalformedPayload,
    /// The save directory could not be created.
    DirectoryCreation,
    /// The frame file could not be written.
    Write,
}

impl std::fmt::Display for IngestErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            IngestErrorKind::MalformedPayload => "malformed_payload",
            IngestErrorKind::DirectoryCreation => "directory_creation",
            IngestErrorKind::Write => "write",
        };
        write!(f, "{}", label)
    }
}

/// A single inbound frame failed to persist.
#[derive(Error, Debug)]
#[error("ingest {kind} error: {message}")]
pub struct IngestError {
    /// Failing stage
    pub kind: IngestErrorKind,
    /// Human-readable detail
    pub message: String,
    /// Target path, when one had been derived
    pub path: Option<PathBuf>,
    /// Underlying I/O error, if any
    #[source]
    pub source: Option<std::io::Error>,
}

impl IngestError {
    /// Create an error without an underlying cause.
    pub fn new(kind: IngestErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create an error wrapping an I/O failure at `path`.
    pub fn io(kind: IngestErrorKind, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        Self {
            kind,
            message: format!("{}: {}", path.display(), source),
            path: Some(path),
            source: Some(source),
        }
    }
}

// =============================================================================
// PiperError
// =============================================================================

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, PiperError>;

/// Primary error type for the simulated detector.
#[derive(Error, Debug)]
pub enum PiperError {
    /// Configuration values parsed but failed semantic validation.
    ///
    /// **Recovery Strategy**: Abort startup (or reject the reconfiguration)
    /// and report the message.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An output sink rejected a record.
    ///
    /// **Error Type**: Transient. Producers skip the emission and retry on the
    /// next tick.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// An inbound frame could not be persisted.
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// A background task failed while the device was shutting down.
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_error_reports_sink_name() {
        let err = SinkError::Full {
            sink: "output".into(),
        };
        assert_eq!(err.sink(), "output");
        assert_eq!(err.to_string(), "sink 'output' is full");
    }

    #[test]
    fn ingest_error_io_includes_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = IngestError::io(IngestErrorKind::Write, "/tmp/x.npy", io);
        assert_eq!(err.kind, IngestErrorKind::Write);
        assert_eq!(err.path.as_deref(), Some(std::path::Path::new("/tmp/x.npy")));
        assert!(err.to_string().starts_with("ingest write error: /tmp/x.npy"));
    }

    #[test]
    fn piper_error_from_sink_error() {
        let err: PiperError = SinkError::Closed {
            sink: "pattern".into(),
        }
        .into();
        assert!(matches!(err, PiperError::Sink(_)));
    }
}
