//! Terminal handler trait.
//!
//! A [`Handler`] is the endpoint that runs after the middleware chain
//! completes without aborting. It writes into the shared [`Response`] and
//! is expected to finalize it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::TesseraResult;
use crate::request::Request;
use crate::response::Response;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased handler shared across requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// The terminal endpoint of an engine.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use tessera_core::{BoxFuture, Handler, Request, Response, TesseraResult};
///
/// struct Hello;
///
/// impl Handler for Hello {
///     fn call<'a>(
///         &'a self,
///         _request: &'a mut Request,
///         response: &'a mut Response,
///     ) -> BoxFuture<'a, TesseraResult<()>> {
///         Box::pin(async move {
///             response.send_text(StatusCode::OK, "hello");
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Handles the request by writing into `response`.
    fn call<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
    ) -> BoxFuture<'a, TesseraResult<()>>;
}

/// A handler built from a closure. See [`handler_fn`].
pub struct FnHandler<F> {
    func: F,
}

/// Creates a [`Handler`] from a closure returning a boxed future.
///
/// ```
/// use http::StatusCode;
/// use tessera_core::handler_fn;
///
/// let handler = handler_fn(|_req, res| {
///     Box::pin(async move {
///         res.send_text(StatusCode::OK, "ok");
///         Ok(())
///     })
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F>(func: F) -> FnHandler<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, TesseraResult<()>>
        + Send
        + Sync
        + 'static,
{
    FnHandler { func }
}

impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, TesseraResult<()>>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
    ) -> BoxFuture<'a, TesseraResult<()>> {
        (self.func)(request, response)
    }
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
    ) -> BoxFuture<'a, TesseraResult<()>> {
        (**self).call(request, response)
    }
}
