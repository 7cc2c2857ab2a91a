//! Wire types for the Gravity inference protocol.
//!
//! Clients send one JSON document per WebSocket text frame, each describing a
//! single inference request:
//!
//! ```json
//! {"requestId":"r1","inputFile":"in.csv","outputFile":"out.csv"}
//! ```
//!
//! The server answers with one [`StatusMessage`] per text frame. A request that passes
//! validation is acknowledged with `pending` and later finished with exactly
//! one terminal `complete` or `error` message:
//!
//! ```json
//! {"status":"pending","requestId":"r1"}
//! {"status":"complete","requestId":"r1"}
//! ```
//!
//! Messages that cannot be attributed to a request id are answered with the
//! bad-message shape, which echoes the raw input back to the sender.
//!
//! This crate performs no I/O. Parsing, validation, and encoding are pure
//! functions so the server and its tests share one definition of the format.

mod errors;
mod request;
mod response;

pub use errors::{MalformedMessage, ValidationError};
pub use request::{ParsedMessage, Request, parse};
pub use response::{Status, StatusMessage};
