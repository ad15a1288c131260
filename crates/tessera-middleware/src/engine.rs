//! The middleware engine.
//!
//! An [`Engine`] owns a primary chain, an optional error chain, options and
//! an optional terminal handler. For each request it:
//!
//! 1. runs the primary chain;
//! 2. if the chain was not aborted, runs the handler;
//! 3. if the response is still open, answers `501 Not Implemented`;
//! 4. on any error from steps 1-3, records the error on the context and
//!    runs the error chain over the same context.
//!
//! ```text
//! Request → [primary chain] ─ not aborted → Handler → (open?) → 501
//!                 │                            │
//!                 └──────── error ─────────────┴──► [error chain] → (open?) → Err
//! ```
//!
//! Errors that nothing recovers are returned from [`Engine::handle`] so the
//! host can apply its own fault handling.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use tessera_core::{BoxedHandler, Handler, Request, Response, TesseraError, TesseraResult};
use tracing::{debug, error, warn};

use crate::chain::{run_chain, Chain, ChainLabel, Slot};
use crate::context::Context;
use crate::factory::ChainConfig;
use crate::middleware::Middleware;
use crate::options::Options;

/// Body of the fallback response when nothing finalized the response.
pub const NOT_IMPLEMENTED_BODY: &str = "Not Implemented";

/// A composed request pipeline.
///
/// Engines are immutable and can be shared across concurrent requests.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use tessera_core::{handler_fn, Response};
/// use tessera_middleware::{ChainConfig, Engine};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let engine = Engine::run(
///     handler_fn(|_req, res| {
///         Box::pin(async move {
///             res.send_text(StatusCode::OK, "hello");
///             Ok(())
///         })
///     }),
///     ChainConfig::new(),
/// );
///
/// let mut request = http::Request::builder().uri("/").body(bytes::Bytes::new()).unwrap();
/// let mut response = Response::new();
/// engine.handle(&mut request, &mut response).await.unwrap();
/// assert_eq!(response.status(), StatusCode::OK);
/// # });
/// ```
#[derive(Clone)]
pub struct Engine {
    handler: Option<BoxedHandler>,
    middleware: Arc<[Slot]>,
    error_middleware: Option<Arc<[Slot]>>,
    options: Options,
}

impl Engine {
    /// Creates an engine around `handler`.
    #[must_use]
    pub fn run<H: Handler>(handler: H, config: ChainConfig) -> Self {
        Self::from_parts(Some(Arc::new(handler)), config)
    }

    /// Creates an engine without a terminal handler.
    ///
    /// Requests that no middleware answers get the `501` fallback.
    #[must_use]
    pub fn without_handler(config: ChainConfig) -> Self {
        Self::from_parts(None, config)
    }

    /// Creates an engine builder.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn from_parts(handler: Option<BoxedHandler>, config: ChainConfig) -> Self {
        Self {
            handler,
            middleware: config.middleware.share(),
            error_middleware: config.error_middleware.as_ref().map(Chain::share),
            options: config.options,
        }
    }

    /// Returns the options every request context starts with.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Returns the primary chain's middleware names, `None` for disabled slots.
    #[must_use]
    pub fn stage_names(&self) -> Vec<Option<&'static str>> {
        slot_names(&self.middleware)
    }

    /// Returns the error chain's middleware names, if an error chain is set.
    #[must_use]
    pub fn error_stage_names(&self) -> Option<Vec<Option<&'static str>>> {
        self.error_middleware.as_deref().map(slot_names)
    }

    /// Returns `true` if a terminal handler is configured.
    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Processes one request with a fresh [`Context`].
    pub async fn handle(&self, request: &mut Request, response: &mut Response) -> TesseraResult<()> {
        let mut ctx = Context::new(self.options.clone());
        self.handle_with_context(request, response, &mut ctx).await
    }

    /// Processes one request with a caller-supplied context.
    ///
    /// Useful when the host wants to seed extensions or inspect the context
    /// afterwards.
    pub async fn handle_with_context(
        &self,
        request: &mut Request,
        response: &mut Response,
        ctx: &mut Context,
    ) -> TesseraResult<()> {
        match self.process(request, response, ctx).await {
            Ok(()) => Ok(()),
            Err(err) => self.on_error(err, request, response, ctx).await,
        }
    }

    /// Processes `request` and converts the result into an `http::Response`.
    ///
    /// Unrecovered errors are still returned as `Err`.
    pub async fn respond(&self, mut request: Request) -> TesseraResult<http::Response<Full<Bytes>>> {
        let mut response = Response::new();
        self.handle(&mut request, &mut response).await?;
        Ok(response.into_http())
    }

    async fn process(
        &self,
        request: &mut Request,
        response: &mut Response,
        ctx: &mut Context,
    ) -> TesseraResult<()> {
        let aborted = run_chain(ChainLabel::Primary, &self.middleware, request, response, ctx).await?;
        self.invoke_handler(aborted, request, response).await?;

        if !response.is_finalized() {
            not_implemented(response);
        }
        Ok(())
    }

    async fn invoke_handler(
        &self,
        aborted: bool,
        request: &mut Request,
        response: &mut Response,
    ) -> TesseraResult<()> {
        if aborted {
            debug!("primary chain aborted; skipping handler");
            return Ok(());
        }
        match &self.handler {
            Some(handler) => handler.call(request, response).await,
            None => Ok(()),
        }
    }

    async fn on_error(
        &self,
        err: TesseraError,
        request: &mut Request,
        response: &mut Response,
        ctx: &mut Context,
    ) -> TesseraResult<()> {
        if response.is_finalized() {
            warn!(
                request_id = %ctx.request_id(),
                error = %err,
                "request failed after the response was finalized"
            );
            return Err(err);
        }

        ctx.runtime_mut().set_error(err.clone());

        let Some(error_middleware) = &self.error_middleware else {
            debug!(request_id = %ctx.request_id(), error = %err, "no error chain configured");
            return Err(err);
        };

        if let Err(chain_err) =
            run_chain(ChainLabel::Error, error_middleware, request, response, ctx).await
        {
            error!(
                request_id = %ctx.request_id(),
                original = %err,
                error = %chain_err,
                "error chain failed"
            );
            return Err(chain_err);
        }

        if response.is_finalized() {
            Ok(())
        } else {
            warn!(
                request_id = %ctx.request_id(),
                error = %err,
                "error chain left the response open"
            );
            Err(err)
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("middleware", &self.stage_names())
            .field("error_middleware", &self.error_stage_names())
            .field("has_handler", &self.has_handler())
            .field("options", &self.options)
            .finish()
    }
}

/// Finalizes `response` with the fixed `501 Not Implemented` fallback.
fn not_implemented(response: &mut Response) {
    debug!("nothing finalized the response; answering 501");
    response.insert_header(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response.end_with(StatusCode::NOT_IMPLEMENTED, NOT_IMPLEMENTED_BODY);
}

fn slot_names(slots: &[Slot]) -> Vec<Option<&'static str>> {
    slots
        .iter()
        .map(|slot| slot.as_ref().map(|m| m.name()))
        .collect()
}

/// Fluent builder for [`Engine`].
#[derive(Default)]
pub struct EngineBuilder {
    handler: Option<BoxedHandler>,
    config: ChainConfig,
}

impl EngineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the terminal handler.
    #[must_use]
    pub fn handler<H: Handler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Appends a middleware to the primary chain.
    #[must_use]
    pub fn use_middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.config.middleware.push(middleware);
        self
    }

    /// Appends a middleware that may be disabled to the primary chain.
    #[must_use]
    pub fn use_optional<M: Middleware>(mut self, middleware: Option<M>) -> Self {
        self.config.middleware.push_optional(middleware);
        self
    }

    /// Appends a middleware to the error chain, creating it if needed.
    #[must_use]
    pub fn use_on_error<M: Middleware>(mut self, middleware: M) -> Self {
        self.config
            .error_middleware
            .get_or_insert_with(Default::default)
            .push(middleware);
        self
    }

    /// Sets `call_done_on_end`.
    #[must_use]
    pub fn call_done_on_end(mut self, enabled: bool) -> Self {
        self.config.options.set_call_done_on_end(enabled);
        self
    }

    /// Adds a caller-defined option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.options.insert(key, value);
        self
    }

    /// Merges a whole [`ChainConfig`] after what was added so far.
    #[must_use]
    pub fn config(mut self, config: ChainConfig) -> Self {
        self.config = self.config.merged(&config);
        self
    }

    /// Builds the engine.
    #[must_use]
    pub fn build(self) -> Engine {
        Engine::from_parts(self.handler, self.config)
    }
}
