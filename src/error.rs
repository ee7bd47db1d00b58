//! Error types for the suprimento-client library.
//!
//! Three failure families exist, and none of them is fatal to a workflow:
//!
//! * [`WorkflowError::UnsupportedFileType`]: the selected file was rejected
//!   locally before any network call was attempted.
//!
//! * [`WorkflowError::Validation`]: one or more review fields are invalid.
//!   Carries a [`FieldErrors`] map so every offending field can be shown next
//!   to its input; nothing is sent to the server.
//!
//! * [`TransportError`]: an upload, generation or fetch call failed. The
//!   workflow stays at the stage where the call was made, with all user data
//!   intact, so the same action can simply be retried.

use crate::review::FieldErrors;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The remote operation a [`TransportError`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `POST /upload`: PDF upload and server-side field extraction.
    Upload,
    /// `POST /review`: document generation from the reviewed fields.
    Submit,
    /// `GET /download/{filename}`: generated artifact fetch.
    Fetch,
    /// `GET /review`: most recently processed fields.
    LatestReview,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Upload => "upload",
            Operation::Submit => "document generation",
            Operation::Fetch => "download",
            Operation::LatestReview => "review lookup",
        };
        f.write_str(s)
    }
}

/// All errors returned by the workflow coordinators.
#[derive(Debug, Error)]
pub enum WorkflowError {
    // ── Upload gate ───────────────────────────────────────────────────────
    /// The selected file is not declared as `application/pdf`.
    #[error("Unsupported file type '{media_type}' for '{name}': only PDF files can be uploaded")]
    UnsupportedFileType { name: String, media_type: String },

    /// `submit` was called on the upload stage with no file selected.
    #[error("No file selected. Choose a PDF before uploading.")]
    NoFileSelected,

    // ── Review ────────────────────────────────────────────────────────────
    /// One or more review fields failed validation.
    #[error("{0}")]
    Validation(FieldErrors),

    // ── Remote calls ──────────────────────────────────────────────────────
    /// A call to the document service failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    // ── Local persistence ─────────────────────────────────────────────────
    /// The fetched artifact could not be written to disk.
    #[error("Failed to save '{path}': {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── State machine ─────────────────────────────────────────────────────
    /// The requested action is not allowed in the current stage or phase.
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// Whether repeating the same action may succeed without user changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::Transport(_) | WorkflowError::SaveFailed { .. }
        )
    }
}

/// A failed call to the remote document service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("{operation} timed out after {secs}s\nCheck the server or increase --timeout.")]
    Timeout { operation: Operation, secs: u64 },

    /// The server answered with a non-success HTTP status.
    #[error("{operation} failed with HTTP {status}: {body}")]
    Status {
        operation: Operation,
        status: u16,
        body: String,
    },

    /// The requested artifact does not exist on the server.
    #[error("Generated file '{filename}' was not found on the server")]
    NotFound { filename: String },

    /// Connection refused, DNS failure, TLS error, …
    #[error("{operation} failed: {reason}\nCheck that the server is reachable.")]
    Network { operation: Operation, reason: String },

    /// The response body did not have the expected shape.
    #[error("Unexpected {operation} response: {reason}")]
    Decode { operation: Operation, reason: String },
}

impl TransportError {
    /// The operation this error belongs to.
    pub fn operation(&self) -> Operation {
        match self {
            TransportError::Timeout { operation, .. }
            | TransportError::Status { operation, .. }
            | TransportError::Network { operation, .. }
            | TransportError::Decode { operation, .. } => *operation,
            TransportError::NotFound { .. } => Operation::Fetch,
        }
    }
}
