//! Per-request context.
//!
//! One [`Context`] exists per request. The primary chain and the error chain
//! see the same instance, so anything a middleware stores on it (request ID,
//! extensions) is still there when error handlers run.
//!
//! The [`Runtime`] part belongs to the engine. The chain runner rebinds its
//! `next`/`done` handles before every middleware turn, and the engine's error
//! boundary records the failure that triggered the error chain. Middleware
//! can only read it.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use tessera_core::{RequestId, TesseraError};
use tracing::warn;

use crate::chain::{ChainControl, ChainLabel};
use crate::middleware::Next;
use crate::options::Options;

/// Chain-control handles and the recorded error for one request.
#[derive(Default)]
pub struct Runtime {
    control: Option<ChainControl>,
    error: Option<TesseraError>,
}

impl Runtime {
    /// Returns a handle that advances the running chain.
    ///
    /// Outside of a chain run the handle does nothing.
    #[must_use]
    pub fn next(&self) -> Next {
        Next::new(self.control.clone())
    }

    /// Aborts the running chain.
    ///
    /// No further middleware of this run execute, and the handler is skipped
    /// when called from the primary chain. Calling it again is a no-op.
    pub fn done(&self) {
        match &self.control {
            Some(control) => control.done(),
            None => warn!("done() called outside of a chain run; ignoring"),
        }
    }

    /// Returns the error that triggered the error chain, if any.
    #[must_use]
    pub fn error(&self) -> Option<&TesseraError> {
        self.error.as_ref()
    }

    /// Returns which chain is currently running, if any.
    #[must_use]
    pub fn current_chain(&self) -> Option<ChainLabel> {
        self.control.as_ref().map(ChainControl::label)
    }

    pub(crate) fn bind(&mut self, control: ChainControl) {
        self.control = Some(control);
    }

    pub(crate) fn unbind(&mut self) {
        self.control = None;
    }

    /// Records the request's error. The first one wins.
    pub(crate) fn set_error(&mut self, error: TesseraError) {
        if let Some(existing) = &self.error {
            warn!(existing = %existing, ignored = %error, "request error already recorded");
            return;
        }
        self.error = Some(error);
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("current_chain", &self.current_chain())
            .field("error", &self.error)
            .finish()
    }
}

/// State shared by every middleware handling one request.
///
/// # Example
///
/// ```
/// use tessera_middleware::{Context, Options};
///
/// #[derive(Debug, PartialEq)]
/// struct Tenant(&'static str);
///
/// let mut ctx = Context::new(Options::new().with("region", "eu"));
/// ctx.set_extension(Tenant("acme"));
///
/// assert_eq!(ctx.get_extension::<Tenant>(), Some(&Tenant("acme")));
/// assert_eq!(ctx.options().get_as::<String>("region").as_deref(), Some("eu"));
/// assert!(ctx.error().is_none());
/// ```
pub struct Context {
    runtime: Runtime,
    options: Options,
    request_id: RequestId,
    started_at: Instant,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Context {
    /// Creates a context with a fresh request ID.
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self {
            runtime: Runtime::default(),
            options,
            request_id: RequestId::new(),
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Returns the runtime handles.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub(crate) fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.runtime
    }

    /// Shorthand for `ctx.runtime().next()`.
    ///
    /// ```ignore
    /// ctx.next().run(request, response, ctx).await?;
    /// ```
    #[must_use]
    pub fn next(&self) -> Next {
        self.runtime.next()
    }

    /// Shorthand for `ctx.runtime().done()`.
    pub fn done(&self) {
        self.runtime.done();
    }

    /// Shorthand for `ctx.runtime().error()`.
    #[must_use]
    pub fn error(&self) -> Option<&TesseraError> {
        self.runtime.error()
    }

    /// Returns the engine options.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Replaces the request ID, e.g. with one propagated by the caller.
    pub fn set_request_id(&mut self, request_id: RequestId) {
        self.request_id = request_id;
    }

    /// Returns when the request entered the engine.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the time elapsed since the request entered the engine.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value, replacing any previous one of that type.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.request_id)
            .field("runtime", &self.runtime)
            .field("options", &self.options)
            .field("extensions", &self.extensions.len())
            .finish_non_exhaustive()
    }
}
