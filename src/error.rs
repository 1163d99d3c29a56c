//! Typed errors for failures a caller is expected to tell apart.
//!
//! Everything else in the crate uses `anyhow::Result` with context strings;
//! the variants here are the ones the HTTP layer maps to a client error.

use thiserror::Error;

/// Configuration and request-state problems surfaced to the caller.
///
/// None of these are fatal to the process.
#[derive(Error, Debug)]
pub enum StudioError {
    #[error("model config is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("model config field '{field}' must be greater than zero")]
    ZeroField { field: &'static str },

    #[error("unknown model choice '{0}' (expected F5-TTS_v1, E2-TTS or Custom)")]
    UnknownChoice(String),

    #[error("checkpoint locator is empty")]
    EmptyCheckpoint,

    #[error("invalid Hugging Face locator '{0}' (expected hf://<user>/<repo>/<file>)")]
    BadLocator(String),

    #[error("chat model is not loaded")]
    ChatModelNotLoaded,

    #[error("speech type row {0} cannot be edited")]
    BadRow(usize),

    #[error("unknown session '{0}'")]
    UnknownSession(String),
}
