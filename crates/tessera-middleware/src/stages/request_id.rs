//! Request ID middleware.
//!
//! Every [`Context`] starts with a freshly generated UUID v7 request ID. This
//! stage optionally replaces it with the caller's `X-Request-ID` and always
//! echoes the final ID on the response so clients can correlate their
//! requests with server logs.
//!
//! ## Request ID Sources
//!
//! 1. **X-Request-ID header**: used when incoming IDs are trusted and the
//!    value parses as a UUID
//! 2. **Generated UUID v7**: the ID the context was created with

use http::header::{HeaderName, HeaderValue};
use tessera_core::{BoxFuture, Request, RequestId, Response, TesseraError, TesseraResult};

use crate::context::Context;
use crate::middleware::Middleware;

/// The header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Middleware that propagates request IDs.
///
/// # Behavior
///
/// 1. Check for `X-Request-ID` header (trusted mode only)
/// 2. If present and valid, store it on the [`Context`]
/// 3. Add the context's ID to the response headers
/// 4. Continue the chain
#[derive(Debug, Clone, Default)]
pub struct RequestIdMiddleware {
    /// Whether to trust incoming request ID headers.
    ///
    /// Should be `false` for external traffic and `true` for
    /// service-to-service calls.
    trust_incoming: bool,
}

impl RequestIdMiddleware {
    /// Creates a middleware that ignores incoming request IDs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a middleware that trusts incoming `X-Request-ID` headers.
    #[must_use]
    pub fn trust_incoming() -> Self {
        Self {
            trust_incoming: true,
        }
    }

    fn extract_request_id(&self, request: &Request) -> Option<RequestId> {
        if !self.trust_incoming {
            return None;
        }

        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(RequestId::parse)
    }
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn call<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, TesseraResult<()>> {
        Box::pin(async move {
            if let Some(request_id) = self.extract_request_id(request) {
                ctx.set_request_id(request_id);
            }

            let value = HeaderValue::try_from(ctx.request_id().to_string())
                .map_err(TesseraError::internal_from)?;
            response.insert_header(HeaderName::from_static(REQUEST_ID_HEADER), value);
            Ok(())
        })
    }
}
