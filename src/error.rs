//! Error types for RepSense
//!
//! Only setup and parsing problems surface as errors. Low detector confidence,
//! degenerate geometry and zero time deltas are handled with defined fallback
//! values inside the pipeline and never reach this type.

use thiserror::Error;

/// Errors that can occur while configuring or driving a coaching session
#[derive(Debug, Error)]
pub enum CoachError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Unknown exercise template: {0}")]
    UnknownTemplate(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("No active session: {0}")]
    NoActiveSession(String),

    #[error("Session {session_id} is not owned by {owner_id}")]
    OwnerMismatch { session_id: String, owner_id: String },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Speech error: {0}")]
    SpeechError(String),
}
