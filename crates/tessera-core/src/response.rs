//! Outgoing response with an explicit, one-shot finalize operation.
//!
//! Middleware and handlers write into a [`Response`] in place and close it
//! with [`Response::end`] (or one of the `send_*` shortcuts). The first call
//! moves the response from open to finalized and runs every hook registered
//! with [`Response::on_finalize`]; later calls change nothing.
//!
//! The engine uses a finalize hook to notice that a middleware already
//! answered the request. Leaf middleware use the same mechanism for
//! fire-and-forget work such as access logging.
//!
//! ```
//! use http::StatusCode;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use tessera_core::Response;
//!
//! let fired = Arc::new(AtomicUsize::new(0));
//! let mut response = Response::new();
//!
//! let counter = Arc::clone(&fired);
//! response.on_finalize(move |_| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! assert!(response.send_text(StatusCode::OK, "hello"));
//! assert!(!response.end());
//! assert_eq!(fired.load(Ordering::SeqCst), 1);
//! ```

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::TesseraResult;

/// Callback run once, when the response is finalized.
pub type FinalizeHook = Box<dyn FnOnce(&Response) + Send + 'static>;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

/// A response under construction.
///
/// Defaults to `200 OK` with no headers and an empty body.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    finalized: bool,
    hooks: Vec<FinalizeHook>,
}

impl Response {
    /// Creates an open `200 OK` response.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            finalized: false,
            hooks: Vec::new(),
        }
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` once the response has been finalized.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Sets the status code. Ignored once finalized.
    pub fn set_status(&mut self, status: StatusCode) {
        if self.reject_write("status") {
            return;
        }
        self.status = status;
    }

    /// Inserts a header, replacing any previous value. Ignored once finalized.
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.reject_write("header") {
            return;
        }
        self.headers.insert(name, value);
    }

    /// Replaces the body. Ignored once finalized.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        if self.reject_write("body") {
            return;
        }
        self.body = body.into();
    }

    /// Registers a hook to run when the response is finalized.
    ///
    /// Hooks run in registration order, at most once. A hook registered
    /// after finalization is dropped without running.
    pub fn on_finalize<F>(&mut self, hook: F)
    where
        F: FnOnce(&Response) + Send + 'static,
    {
        if self.finalized {
            debug!("response already finalized; finalize hook will not run");
            return;
        }
        self.hooks.push(Box::new(hook));
    }

    /// Finalizes the response.
    ///
    /// Returns `true` if this call closed the response. Every later call is a
    /// no-op that returns `false`: hooks do not run again.
    pub fn end(&mut self) -> bool {
        if self.finalized {
            debug!(status = self.status.as_u16(), "response already finalized; ignoring end");
            return false;
        }
        self.finalized = true;

        let hooks = std::mem::take(&mut self.hooks);
        for hook in hooks {
            hook(&*self);
        }
        true
    }

    /// Sets status and body, then finalizes.
    pub fn end_with(&mut self, status: StatusCode, body: impl Into<Bytes>) -> bool {
        if self.finalized {
            return self.end();
        }
        self.status = status;
        self.body = body.into();
        self.end()
    }

    /// Finalizes with a plain-text body.
    pub fn send_text(&mut self, status: StatusCode, text: impl Into<String>) -> bool {
        if !self.finalized {
            self.headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
        }
        self.end_with(status, text.into())
    }

    /// Finalizes with a JSON body.
    ///
    /// Fails only if `value` cannot be serialized; the response stays open
    /// in that case.
    pub fn send_json<T: Serialize + ?Sized>(
        &mut self,
        status: StatusCode,
        value: &T,
    ) -> TesseraResult<bool> {
        let body = serde_json::to_vec(value)?;
        if !self.finalized {
            self.headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        }
        Ok(self.end_with(status, body))
    }

    /// Converts into an `http::Response` for the host transport.
    #[must_use]
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    fn reject_write(&self, what: &'static str) -> bool {
        if self.finalized {
            warn!(field = what, "write to a finalized response ignored");
        }
        self.finalized
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("finalized", &self.finalized)
            .field("pending_hooks", &self.hooks.len())
            .finish()
    }
}
