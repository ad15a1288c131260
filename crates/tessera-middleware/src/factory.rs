//! Engine composition from defaults plus call-site overrides.
//!
//! A [`ChainConfig`] bundles the primary chain, the optional error chain and
//! the options of an engine. An [`EngineFactory`] holds a default
//! configuration and stamps out engines with per-call additions:
//!
//! - primary chains concatenate, defaults first;
//! - error chains concatenate the same way, absent plus absent stays absent;
//! - options shallow-merge, call-site keys win.

use std::sync::Arc;

use tessera_core::{BoxedHandler, Handler};

use crate::chain::Chain;
use crate::engine::Engine;
use crate::middleware::Middleware;
use crate::options::Options;

/// Chains and options for one engine.
#[derive(Debug, Clone, Default)]
pub struct ChainConfig {
    /// Middleware run before the handler.
    pub middleware: Chain,
    /// Middleware run after a failure. `None` means errors are returned.
    pub error_middleware: Option<Chain>,
    /// Options every request context starts with.
    pub options: Options,
}

impl ChainConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware to the primary chain.
    #[must_use]
    pub fn with_middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Replaces the primary chain.
    #[must_use]
    pub fn with_chain(mut self, chain: Chain) -> Self {
        self.middleware = chain;
        self
    }

    /// Appends a middleware to the error chain, creating it if needed.
    #[must_use]
    pub fn with_error_middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.error_middleware
            .get_or_insert_with(Chain::new)
            .push(middleware);
        self
    }

    /// Replaces the error chain.
    #[must_use]
    pub fn with_error_chain(mut self, chain: Chain) -> Self {
        self.error_middleware = Some(chain);
        self
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Returns `self` with `overrides` merged on top.
    #[must_use]
    pub fn merged(self, overrides: &ChainConfig) -> ChainConfig {
        let error_middleware = match (&self.error_middleware, &overrides.error_middleware) {
            (None, None) => None,
            (Some(defaults), None) => Some(defaults.clone()),
            (None, Some(extra)) => Some(extra.clone()),
            (Some(defaults), Some(extra)) => Some(defaults.concat(extra)),
        };

        ChainConfig {
            middleware: self.middleware.concat(&overrides.middleware),
            error_middleware,
            options: self.options.merged(&overrides.options),
        }
    }
}

/// Builds engines that share a default configuration.
///
/// # Example
///
/// ```
/// use tessera_middleware::{ChainConfig, EngineFactory, Options};
/// use tessera_middleware::stages::{ErrorMapper, RequestIdMiddleware};
///
/// let factory = EngineFactory::new(
///     ChainConfig::new()
///         .with_middleware(RequestIdMiddleware::new())
///         .with_error_middleware(ErrorMapper::new())
///         .with_options(Options::new().with("service", "billing")),
/// );
///
/// let engine = factory.engine_without_handler(
///     ChainConfig::new().with_options(Options::new().with_call_done_on_end(false)),
/// );
///
/// assert_eq!(engine.stage_names(), vec![Some("request_id")]);
/// assert!(!engine.options().call_done_on_end());
/// assert_eq!(engine.options().get_as::<String>("service").as_deref(), Some("billing"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct EngineFactory {
    defaults: ChainConfig,
}

impl EngineFactory {
    /// Creates a factory around `defaults`.
    #[must_use]
    pub fn new(defaults: ChainConfig) -> Self {
        Self { defaults }
    }

    /// Returns the default configuration.
    #[must_use]
    pub fn defaults(&self) -> &ChainConfig {
        &self.defaults
    }

    /// Builds an engine around `handler` with `overrides` merged in.
    #[must_use]
    pub fn engine<H: Handler>(&self, handler: H, overrides: ChainConfig) -> Engine {
        self.build(Some(Arc::new(handler)), &overrides)
    }

    /// Builds an engine around an already shared handler.
    #[must_use]
    pub fn engine_shared(&self, handler: BoxedHandler, overrides: ChainConfig) -> Engine {
        self.build(Some(handler), &overrides)
    }

    /// Builds an engine with no handler and `overrides` merged in.
    #[must_use]
    pub fn engine_without_handler(&self, overrides: ChainConfig) -> Engine {
        self.build(None, &overrides)
    }

    fn build(&self, handler: Option<BoxedHandler>, overrides: &ChainConfig) -> Engine {
        Engine::from_parts(handler, self.defaults.clone().merged(overrides))
    }
}
