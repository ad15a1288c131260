//! Request body size limit.
//!
//! Rejects requests whose body, or declared `Content-Length`, exceeds a byte
//! limit. The rejection finalizes the response with `413 Payload Too Large`
//! and the standard error envelope, which ends the chain when
//! `call_done_on_end` is on.

use http::header::CONTENT_LENGTH;
use tessera_core::{BoxFuture, ErrorKind, Request, Response, TesseraResult};
use tracing::debug;

use super::error_envelope;
use crate::context::Context;
use crate::middleware::Middleware;

/// Default limit: 1 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Middleware enforcing a maximum request body size.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimit {
    max_bytes: usize,
}

impl BodyLimit {
    /// Creates a limit of `max_bytes`.
    #[must_use]
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Returns the configured limit.
    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn declared_length(request: &Request) -> Option<usize> {
        request
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
    }

    fn exceeds(&self, request: &Request) -> Option<usize> {
        let actual = request.body().len();
        let declared = Self::declared_length(request).unwrap_or(0);
        let size = actual.max(declared);
        (size > self.max_bytes).then_some(size)
    }
}

impl Default for BodyLimit {
    fn default() -> Self {
        Self::new(DEFAULT_BODY_LIMIT)
    }
}

impl Middleware for BodyLimit {
    fn name(&self) -> &'static str {
        "body_limit"
    }

    fn call<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, TesseraResult<()>> {
        Box::pin(async move {
            let Some(size) = self.exceeds(request) else {
                return Ok(());
            };

            debug!(
                request_id = %ctx.request_id(),
                size,
                limit = self.max_bytes,
                "request body over limit"
            );
            let kind = ErrorKind::PayloadTooLarge;
            let message = format!("request body exceeds {} bytes", self.max_bytes);
            let envelope = error_envelope(kind.code(), &message, ctx.request_id());
            response.send_json(kind.default_status(), &envelope)?;
            Ok(())
        })
    }
}
