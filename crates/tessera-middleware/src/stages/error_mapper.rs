//! Error-to-status mapping.
//!
//! [`ErrorMapper`] belongs on the error chain. It reads the error the engine
//! recorded on the context, picks a status for its [`ErrorKind`] and
//! finalizes the response with the standard envelope:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "NOT_FOUND",
//!     "message": "no such order",
//!     "request_id": "01890a5d-ac96-774b-bcce-b302099a8057"
//!   }
//! }
//! ```
//!
//! Messages of server errors are replaced with a generic text unless
//! [`ErrorMapper::expose_internal_errors`] is enabled.
//!
//! # Example
//!
//! ```
//! use http::StatusCode;
//! use tessera_core::ErrorKind;
//! use tessera_middleware::stages::ErrorMapper;
//!
//! let mapper = ErrorMapper::new()
//!     .map_kind(ErrorKind::Unavailable, StatusCode::BAD_GATEWAY)
//!     .expose_internal_errors(cfg!(debug_assertions));
//!
//! assert_eq!(mapper.status_for(ErrorKind::Unavailable), StatusCode::BAD_GATEWAY);
//! assert_eq!(mapper.status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
//! ```

use http::StatusCode;
use tessera_core::{BoxFuture, ErrorKind, Request, Response, TesseraResult};
use tracing::debug;

use super::error_envelope;
use crate::context::Context;
use crate::middleware::Middleware;

const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

/// Error chain leaf that renders the recorded error.
#[derive(Debug, Clone)]
pub struct ErrorMapper {
    expose_internal_errors: bool,
    internal_error_message: String,
    overrides: Vec<(ErrorKind, StatusCode)>,
}

impl Default for ErrorMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorMapper {
    /// Creates a mapper with the default kind-to-status table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            expose_internal_errors: false,
            internal_error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            overrides: Vec::new(),
        }
    }

    /// Sets whether server error messages reach the client.
    ///
    /// **Warning**: Only enable this in development environments.
    #[must_use]
    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    /// Sets the message shown in place of hidden server errors.
    #[must_use]
    pub fn internal_error_message(mut self, message: impl Into<String>) -> Self {
        self.internal_error_message = message.into();
        self
    }

    /// Maps `kind` to `status`, taking precedence over the default table.
    ///
    /// Later calls for the same kind win.
    #[must_use]
    pub fn map_kind(mut self, kind: ErrorKind, status: StatusCode) -> Self {
        self.overrides.retain(|(existing, _)| *existing != kind);
        self.overrides.push((kind, status));
        self
    }

    /// Returns the status used for `kind`.
    #[must_use]
    pub fn status_for(&self, kind: ErrorKind) -> StatusCode {
        if let Some((_, status)) = self.overrides.iter().find(|(k, _)| *k == kind) {
            return *status;
        }

        match kind {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Middleware for ErrorMapper {
    fn name(&self) -> &'static str {
        "error_mapper"
    }

    fn call<'a>(
        &'a self,
        _request: &'a mut Request,
        response: &'a mut Response,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, TesseraResult<()>> {
        Box::pin(async move {
            let Some(error) = ctx.error() else {
                debug!("no recorded error; error mapper has nothing to do");
                return Ok(());
            };

            let kind = error.kind();
            let status = self.status_for(kind);
            let message = if status.is_server_error() && !self.expose_internal_errors {
                self.internal_error_message.as_str()
            } else {
                error.message()
            };

            let envelope = error_envelope(kind.code(), message, ctx.request_id());
            response.send_json(status, &envelope)?;
            Ok(())
        })
    }
}
