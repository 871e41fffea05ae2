use thiserror::Error;

use crate::metrics::ToolOutcome;

pub const STORE_UNAVAILABLE_MESSAGE: &str =
    "I'm having trouble accessing the database right now. Please try again in a moment.";
pub const UNEXPECTED_FAILURE_MESSAGE: &str =
    "I'm sorry, something went wrong while processing your request. Please try again.";

/// Failure kinds a tool handler can produce.
///
/// `Validation` and `NotFound` carry the sentence spoken back to the caller.
/// `Store` and `Unexpected` carry internal detail that is logged and replaced
/// by a generic sentence.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store failure: {0}")]
    Store(String),
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl ToolError {
    pub fn validation(prompt: impl Into<String>) -> Self {
        Self::Validation(prompt.into())
    }

    pub fn not_found(prompt: impl Into<String>) -> Self {
        Self::NotFound(prompt.into())
    }

    /// Text that is safe to speak to the caller.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Validation(prompt) | Self::NotFound(prompt) => prompt,
            Self::Store(_) => STORE_UNAVAILABLE_MESSAGE,
            Self::Unexpected(_) => UNEXPECTED_FAILURE_MESSAGE,
        }
    }

    pub fn outcome(&self) -> ToolOutcome {
        match self {
            Self::Validation(_) => ToolOutcome::Validation,
            Self::NotFound(_) => ToolOutcome::NotFound,
            Self::Store(_) => ToolOutcome::StoreError,
            Self::Unexpected(_) => ToolOutcome::Unexpected,
        }
    }
}

/// The request body could not be read as a tool-call envelope, so there is no
/// `toolCallId` to answer against.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("no tool call list found in request")]
    MissingToolCalls,
    #[error("tool call is missing its id")]
    MissingToolCallId,
}
