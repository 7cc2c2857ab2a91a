//! Outbound status messages.
//!
//! [`StatusMessage`] can only be built through its four constructors, one
//! per response shape, so no other field combination reaches the wire.

use serde::Serialize;

/// Lifecycle status reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The message or request failed.
    Error,
    /// The request passed validation and is executing.
    Pending,
    /// The handler finished and produced the output file.
    Complete,
}

/// A single status message sent to a client as one text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<String>,
}

impl StatusMessage {
    /// Error for a message whose request id is unknown. Echoes the raw input.
    pub fn bad_message(error: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            error: Some(error.into()),
            request_id: None,
            request: Some(raw.into()),
        }
    }

    /// Error correlated with a known request id.
    pub fn error(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            error: Some(error.into()),
            request_id: Some(request_id.into()),
            request: None,
        }
    }

    /// Acknowledges a request that passed validation.
    pub fn pending(request_id: impl Into<String>) -> Self {
        Self {
            status: Status::Pending,
            error: None,
            request_id: Some(request_id.into()),
            request: None,
        }
    }

    /// Reports a request that completed successfully.
    pub fn complete(request_id: impl Into<String>) -> Self {
        Self {
            status: Status::Complete,
            error: None,
            request_id: Some(request_id.into()),
            request: None,
        }
    }

    /// The reported status.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Error text, present for both error shapes.
    #[must_use]
    pub fn error_text(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Correlated request id, absent for the bad-message shape.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Returns true for `complete` and correlated `error` messages.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        match self.status {
            Status::Complete => true,
            Status::Error => self.request_id.is_some(),
            Status::Pending => false,
        }
    }

    /// Serialises the message as the JSON text of one frame.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error, which only occurs for allocation
    /// failures given the field types involved.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
