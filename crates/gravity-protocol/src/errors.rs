//! Errors surfaced while parsing and validating inbound messages.
//!
//! The display text of each variant is sent to clients verbatim, so every
//! failure mode has a distinct message.

use thiserror::Error;

/// Inbound message that is not well-formed JSON.
#[derive(Debug, Error)]
#[error("Invalid Request")]
pub struct MalformedMessage {
    raw: String,
    #[source]
    source: Option<serde_json::Error>,
}

impl MalformedMessage {
    pub(crate) const fn new(raw: String, source: Option<serde_json::Error>) -> Self {
        Self { raw, source }
    }

    /// The raw input, echoed back in the bad-message response.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Parser diagnostic, when one is available.
    #[must_use]
    pub fn detail(&self) -> Option<String> {
        self.source.as_ref().map(ToString::to_string)
    }
}

/// Structural problems found in a well-formed message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The message parsed, but is not a JSON object.
    #[error("Request is not a JSON object")]
    NotARecord,
    /// `requestId` is absent, not a string, or empty.
    #[error("Request does not contain requestId")]
    MissingRequestId,
    /// `inputFile` is absent, not a string, or empty.
    #[error("Request does not contain inputFile")]
    MissingInputFile {
        /// Identifier recovered before the failure.
        request_id: String,
    },
    /// `outputFile` is absent, not a string, or empty.
    #[error("Request does not contain outputFile")]
    MissingOutputFile {
        /// Identifier recovered before the failure.
        request_id: String,
    },
}

impl ValidationError {
    /// Returns the request id when it was recovered before validation failed.
    ///
    /// Errors with an id are reported with the correlated error shape; the
    /// others fall back to the bad-message shape.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::NotARecord | Self::MissingRequestId => None,
            Self::MissingInputFile { request_id } | Self::MissingOutputFile { request_id } => {
                Some(request_id.as_str())
            }
        }
    }
}
