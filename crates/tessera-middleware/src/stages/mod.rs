//! Built-in leaf middleware.
//!
//! These stages are ordinary [`Middleware`](crate::Middleware)
//! implementations built on the public contract only. None of them is
//! required; register the ones a service needs.
//!
//! ## Primary chain
//!
//! - [`request_id`] - Propagate or keep the request ID, echo it on the response
//! - [`request_logger`] - Emit one access-log event when the response is finalized
//! - [`body_limit`] - Reject oversized request bodies with `413`
//!
//! ## Error chain
//!
//! - [`error_mapper`] - Map the recorded error to a status and a JSON envelope

pub mod body_limit;
pub mod error_mapper;
pub mod request_id;
pub mod request_logger;

pub use body_limit::BodyLimit;
pub use error_mapper::ErrorMapper;
pub use request_id::{RequestIdMiddleware, REQUEST_ID_HEADER};
pub use request_logger::{LogEntry, RequestLogger};

use serde_json::{json, Value};
use tessera_core::RequestId;

/// Builds the standard error envelope.
///
/// ```json
/// {
///   "error": {
///     "code": "ERROR_CODE",
///     "message": "Human-readable error message",
///     "request_id": "uuid-v7-request-id"
///   }
/// }
/// ```
#[must_use]
pub fn error_envelope(code: &str, message: &str, request_id: RequestId) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message,
            "request_id": request_id.to_string(),
        }
    })
}
