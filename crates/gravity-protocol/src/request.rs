//! Request parsing and validation.
//!
//! Parsing and validation are separate steps: a message that is not JSON is a
//! [`MalformedMessage`], while a JSON value with missing fields produces a
//! [`ValidationError`]. Fields are checked in wire order (`requestId`,
//! `inputFile`, `outputFile`) so the id is known for the later failures.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{MalformedMessage, ValidationError};

const REQUEST_ID: &str = "requestId";
const INPUT_FILE: &str = "inputFile";
const OUTPUT_FILE: &str = "outputFile";

/// A validated inference request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    request_id: String,
    input_file: String,
    output_file: String,
}

impl Request {
    /// Builds a request from its three fields.
    pub fn new(
        request_id: impl Into<String>,
        input_file: impl Into<String>,
        output_file: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            input_file: input_file.into(),
            output_file: output_file.into(),
        }
    }

    /// Identifier used to correlate status messages.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Path the handler reads from.
    #[must_use]
    pub fn input_file(&self) -> &Path {
        Path::new(&self.input_file)
    }

    /// Path the handler is expected to write.
    #[must_use]
    pub fn output_file(&self) -> &Path {
        Path::new(&self.output_file)
    }
}

/// A well-formed JSON message that has not been validated yet.
#[derive(Debug, Clone)]
pub struct ParsedMessage {
    raw: String,
    value: Value,
}

/// Parses one inbound frame.
///
/// Trailing whitespace is trimmed before parsing.
///
/// # Errors
///
/// Returns [`MalformedMessage`] carrying the raw input when the frame is not
/// UTF-8 or not a JSON document.
pub fn parse(raw: &[u8]) -> Result<ParsedMessage, MalformedMessage> {
    let trimmed = trim_trailing_whitespace(raw);
    let Ok(text) = std::str::from_utf8(trimmed) else {
        return Err(MalformedMessage::new(
            String::from_utf8_lossy(trimmed).into_owned(),
            None,
        ));
    };
    match serde_json::from_str(text) {
        Ok(value) => Ok(ParsedMessage {
            raw: text.to_owned(),
            value,
        }),
        Err(source) => Err(MalformedMessage::new(text.to_owned(), Some(source))),
    }
}

impl ParsedMessage {
    /// The message text as received, without trailing whitespace.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Validates the message structure. Never touches the filesystem.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found, checking `requestId`,
    /// then `inputFile`, then `outputFile`.
    pub fn validate(&self) -> Result<Request, ValidationError> {
        let Value::Object(record) = &self.value else {
            return Err(ValidationError::NotARecord);
        };
        let request_id =
            required_string(record, REQUEST_ID).ok_or(ValidationError::MissingRequestId)?;
        let Some(input_file) = required_string(record, INPUT_FILE) else {
            return Err(ValidationError::MissingInputFile {
                request_id: request_id.to_owned(),
            });
        };
        let Some(output_file) = required_string(record, OUTPUT_FILE) else {
            return Err(ValidationError::MissingOutputFile {
                request_id: request_id.to_owned(),
            });
        };
        Ok(Request::new(request_id, input_file, output_file))
    }
}

fn required_string<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    bytes.get(..end).unwrap_or_default()
}
