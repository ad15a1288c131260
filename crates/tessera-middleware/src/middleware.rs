//! Core middleware trait and types.
//!
//! This module defines the [`Middleware`] trait that every chain entry
//! implements, the [`Next`] handle used to continue the chain explicitly,
//! and [`from_fn`] for closure-based middleware.
//!
//! # Chain control
//!
//! A middleware receives the request, the response and the shared
//! [`Context`]. During its turn it may:
//!
//! - return normally: the chain continues with the next middleware;
//! - call `ctx.next().run(request, response, ctx).await` to run the rest of
//!   the chain *inside* its own turn (useful for work after downstream
//!   middleware completed);
//! - call `ctx.done()` to abort the chain, skipping the remaining middleware
//!   and the handler;
//! - finalize the response, which aborts the chain as well unless the engine
//!   runs with `call_done_on_end = false`;
//! - return an error, which aborts the chain and hands control to the
//!   engine's error chain.
//!
//! # Example
//!
//! ```
//! use tessera_core::{BoxFuture, Request, Response, TesseraResult};
//! use tessera_middleware::{Context, Middleware};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn call<'a>(
//!         &'a self,
//!         request: &'a mut Request,
//!         response: &'a mut Response,
//!         ctx: &'a mut Context,
//!     ) -> BoxFuture<'a, TesseraResult<()>> {
//!         Box::pin(async move {
//!             ctx.next().run(request, response, ctx).await?;
//!             tracing::info!(elapsed_ms = ctx.elapsed().as_millis() as u64, "downstream done");
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use std::sync::Arc;

use tessera_core::{BoxFuture, Request, Response, TesseraResult};
use tracing::warn;

use crate::chain::ChainControl;
use crate::context::Context;

/// A type-erased middleware shared between chains and engines.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The core middleware trait.
///
/// Implementations must be stateless with respect to a single request:
/// request-scoped data belongs on the [`Context`].
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this middleware, used in logs.
    fn name(&self) -> &'static str;

    /// Processes one turn of the chain.
    fn call<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, TesseraResult<()>>;
}

/// Handle that continues the chain from the current middleware turn.
///
/// Only the first `run` per turn advances the chain; later calls, and calls
/// after the chain was aborted, log a warning and return `Ok(())`.
#[derive(Clone)]
pub struct Next {
    control: Option<ChainControl>,
}

impl Next {
    pub(crate) fn new(control: Option<ChainControl>) -> Self {
        Self { control }
    }

    /// Runs the remaining middleware of the chain.
    pub async fn run(
        self,
        request: &mut Request,
        response: &mut Response,
        ctx: &mut Context,
    ) -> TesseraResult<()> {
        match self.control {
            Some(control) => control.advance(request, response, ctx).await,
            None => {
                warn!("next() called outside of a chain run; ignoring");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("chain", &self.control.as_ref().map(ChainControl::label))
            .finish()
    }
}

/// A middleware built from a closure. See [`from_fn`].
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

/// Creates a [`Middleware`] from a closure returning a boxed future.
///
/// ```
/// use http::StatusCode;
/// use tessera_middleware::from_fn;
///
/// let deny = from_fn("deny", |_req, res, _ctx| {
///     Box::pin(async move {
///         res.send_text(StatusCode::FORBIDDEN, "denied");
///         Ok(())
///     })
/// });
/// # let _ = deny;
/// ```
pub fn from_fn<F>(name: &'static str, func: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(
            &'a mut Request,
            &'a mut Response,
            &'a mut Context,
        ) -> BoxFuture<'a, TesseraResult<()>>
        + Send
        + Sync
        + 'static,
{
    FnMiddleware { name, func }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(
            &'a mut Request,
            &'a mut Response,
            &'a mut Context,
        ) -> BoxFuture<'a, TesseraResult<()>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn call<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, TesseraResult<()>> {
        (self.func)(request, response, ctx)
    }
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn call<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, TesseraResult<()>> {
        (**self).call(request, response, ctx)
    }
}
