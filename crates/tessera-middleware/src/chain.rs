//! Chain runner.
//!
//! A [`Chain`] is an ordered list of middleware. The runner drives one chain
//! for one request: it walks a forward-only cursor over the list, binds fresh
//! `next`/`done` handles into the context before every middleware turn, and
//! stops either when the list is exhausted or when the run is aborted.
//!
//! ```text
//!            ┌──────────── next() / auto-advance ────────────┐
//!            ▼                                               │
//! Idle ─► Running ──► middleware turn ──────────────────────┘
//!            │               │
//!            │ exhausted     │ done() / response finalized / error
//!            ▼               ▼
//!        Exhausted        Aborted ─────► Done (yields `aborted`)
//! ```
//!
//! Calling `next()` is optional. A middleware that neither calls `next()`
//! nor aborts the run is followed by the next middleware automatically once
//! its turn completes.
//!
//! All per-run flags live in a `ChainExecutionState` owned by a single run.
//! The primary chain and the error chain of one request get separate runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use tessera_core::{BoxFuture, Request, Response, TesseraResult};
use tracing::{debug, warn};

use crate::context::Context;
use crate::middleware::{BoxedMiddleware, Middleware};

/// One position in a chain. `None` is a disabled slot that is skipped.
pub(crate) type Slot = Option<BoxedMiddleware>;

/// Identifies which of a request's two chains a run belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainLabel {
    /// The chain that runs before the handler.
    Primary,
    /// The chain that runs after a failure.
    Error,
}

impl ChainLabel {
    /// Returns the label used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Error => "error",
        }
    }
}

/// An ordered list of middleware.
///
/// Chains are cheap to clone: middleware are shared behind `Arc`.
///
/// # Example
///
/// ```
/// use tessera_middleware::chain::Chain;
/// use tessera_middleware::stages::{RequestIdMiddleware, RequestLogger};
///
/// let chain = Chain::new()
///     .with(RequestIdMiddleware::new())
///     .with_optional(None::<RequestLogger>);
///
/// assert_eq!(chain.len(), 2);
/// assert_eq!(chain.names(), vec![Some("request_id"), None]);
/// ```
#[derive(Clone, Default)]
pub struct Chain {
    slots: Vec<Slot>,
}

impl Chain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware.
    #[must_use]
    pub fn with<M: Middleware>(mut self, middleware: M) -> Self {
        self.push(middleware);
        self
    }

    /// Appends a middleware that may be disabled.
    ///
    /// A `None` keeps its position in the chain but is skipped at run time.
    #[must_use]
    pub fn with_optional<M: Middleware>(mut self, middleware: Option<M>) -> Self {
        self.push_optional(middleware);
        self
    }

    /// Appends a middleware.
    pub fn push<M: Middleware>(&mut self, middleware: M) {
        self.slots.push(Some(Arc::new(middleware)));
    }

    /// Appends an already shared middleware.
    pub fn push_shared(&mut self, middleware: BoxedMiddleware) {
        self.slots.push(Some(middleware));
    }

    /// Appends a middleware that may be disabled.
    pub fn push_optional<M: Middleware>(&mut self, middleware: Option<M>) {
        self.slots
            .push(middleware.map(|m| Arc::new(m) as BoxedMiddleware));
    }

    /// Returns a new chain with `self` followed by `other`.
    #[must_use]
    pub fn concat(&self, other: &Chain) -> Chain {
        let mut slots = Vec::with_capacity(self.slots.len() + other.slots.len());
        slots.extend(self.slots.iter().cloned());
        slots.extend(other.slots.iter().cloned());
        Chain { slots }
    }

    /// Returns the number of slots, disabled ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the chain has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the middleware names in order, `None` for disabled slots.
    #[must_use]
    pub fn names(&self) -> Vec<Option<&'static str>> {
        self.slots
            .iter()
            .map(|slot| slot.as_ref().map(|m| m.name()))
            .collect()
    }

    pub(crate) fn share(&self) -> Arc<[Slot]> {
        self.slots.iter().cloned().collect()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl FromIterator<BoxedMiddleware> for Chain {
    fn from_iter<I: IntoIterator<Item = BoxedMiddleware>>(iter: I) -> Self {
        Chain {
            slots: iter.into_iter().map(Some).collect(),
        }
    }
}

/// Flags owned by a single chain run.
#[derive(Debug, Default)]
pub(crate) struct ChainExecutionState {
    execution_was_aborted: AtomicBool,
    ran_at_least_one_middleware: AtomicBool,
    interceptor_installed: AtomicBool,
}

impl ChainExecutionState {
    pub(crate) fn execution_was_aborted(&self) -> bool {
        self.execution_was_aborted.load(Ordering::SeqCst)
    }

    pub(crate) fn ran_at_least_one_middleware(&self) -> bool {
        self.ran_at_least_one_middleware.load(Ordering::SeqCst)
    }

    /// Returns `true` if this call moved the run into the aborted state.
    fn abort(&self) -> bool {
        !self.execution_was_aborted.swap(true, Ordering::SeqCst)
    }

    fn mark_ran(&self) {
        self.ran_at_least_one_middleware.store(true, Ordering::SeqCst);
    }
}

/// One invocation of the runner over one chain.
pub(crate) struct ChainRun {
    label: ChainLabel,
    slots: Arc<[Slot]>,
    cursor: AtomicUsize,
    state: ChainExecutionState,
}

impl ChainRun {
    fn new(label: ChainLabel, slots: Arc<[Slot]>) -> Self {
        Self {
            label,
            slots,
            cursor: AtomicUsize::new(0),
            state: ChainExecutionState::default(),
        }
    }

    pub(crate) fn state(&self) -> &ChainExecutionState {
        &self.state
    }

    fn next_slot(&self) -> Option<(usize, Slot)> {
        let position = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.slots.get(position).map(|slot| (position, slot.clone()))
    }

    fn done(&self) {
        if self.state.abort() {
            debug!(chain = self.label.as_str(), "chain aborted by done()");
        } else {
            warn!(
                chain = self.label.as_str(),
                "done() called on an already aborted chain; ignoring"
            );
        }
    }

    /// Registers the finalize hook that aborts this run. Once per run.
    fn install_interceptor(self: &Arc<Self>, response: &mut Response) {
        if self.state.interceptor_installed.swap(true, Ordering::SeqCst) {
            return;
        }

        let run: Weak<ChainRun> = Arc::downgrade(self);
        response.on_finalize(move |res| {
            let Some(run) = run.upgrade() else {
                return;
            };
            if run.state.abort() {
                debug!(
                    chain = run.label.as_str(),
                    status = res.status().as_u16(),
                    "response finalized; chain aborted"
                );
            }
        });
    }
}

/// Marks whether `next()` already advanced the chain from one turn.
#[derive(Debug, Default)]
struct Pull {
    chain_was_pulled: AtomicBool,
}

impl Pull {
    /// Returns `true` for the first caller only.
    fn consume(&self) -> bool {
        !self.chain_was_pulled.swap(true, Ordering::SeqCst)
    }
}

/// The `next`/`done` handles bound into the context for one turn.
#[derive(Clone)]
pub(crate) struct ChainControl {
    run: Arc<ChainRun>,
    pull: Arc<Pull>,
}

impl ChainControl {
    pub(crate) fn label(&self) -> ChainLabel {
        self.run.label
    }

    pub(crate) fn done(&self) {
        self.run.done();
    }

    pub(crate) async fn advance(
        self,
        request: &mut Request,
        response: &mut Response,
        ctx: &mut Context,
    ) -> TesseraResult<()> {
        let chain = self.run.label.as_str();
        if self.run.state.execution_was_aborted() {
            warn!(chain, "next() called after the chain was aborted; ignoring");
            return Ok(());
        }
        if !self.pull.consume() {
            warn!(chain, "next() called more than once in one turn; ignoring");
            return Ok(());
        }
        pull_chain(self.run, request, response, ctx).await
    }
}

/// Runs `slots` to exhaustion or abort and returns whether the run aborted.
///
/// A middleware error aborts the run and is returned as-is.
pub(crate) async fn run_chain(
    label: ChainLabel,
    slots: &Arc<[Slot]>,
    request: &mut Request,
    response: &mut Response,
    ctx: &mut Context,
) -> TesseraResult<bool> {
    let run = Arc::new(ChainRun::new(label, Arc::clone(slots)));
    debug!(chain = label.as_str(), slots = slots.len(), "chain started");

    let outcome = pull_chain(Arc::clone(&run), request, response, ctx).await;
    ctx.runtime_mut().unbind();

    let state = run.state();
    debug!(
        chain = label.as_str(),
        aborted = state.execution_was_aborted(),
        ran_any = state.ran_at_least_one_middleware(),
        failed = outcome.is_err(),
        "chain finished"
    );
    outcome.map(|()| state.execution_was_aborted())
}

fn pull_chain<'a>(
    run: Arc<ChainRun>,
    request: &'a mut Request,
    response: &'a mut Response,
    ctx: &'a mut Context,
) -> BoxFuture<'a, TesseraResult<()>> {
    Box::pin(async move {
        let chain = run.label.as_str();
        let slot = run.next_slot();

        let pull = Arc::new(Pull::default());
        ctx.runtime_mut().bind(ChainControl {
            run: Arc::clone(&run),
            pull: Arc::clone(&pull),
        });

        if ctx.options().call_done_on_end() {
            run.install_interceptor(response);
        }

        let Some((position, slot)) = slot else {
            return Ok(());
        };

        match slot {
            Some(middleware) => {
                debug!(chain, position, middleware = middleware.name(), "invoking middleware");
                if let Err(err) = middleware.call(request, response, ctx).await {
                    run.state.abort();
                    debug!(
                        chain,
                        position,
                        middleware = middleware.name(),
                        error = %err,
                        "middleware failed; chain aborted"
                    );
                    return Err(err);
                }
                run.state.mark_ran();
            }
            None => {
                warn!(chain, position, "skipping disabled middleware slot");
            }
        }

        if run.state.execution_was_aborted() {
            return Ok(());
        }

        if pull.consume() {
            pull_chain(run, request, response, ctx).await
        } else {
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::from_fn;
    use crate::options::Options;
    use bytes::Bytes;
    use http::StatusCode;
    use std::sync::Mutex;

    fn request() -> Request {
        http::Request::builder().uri("/chain").body(Bytes::new()).unwrap()
    }

    fn recorder(
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> impl Middleware {
        let log = Arc::clone(log);
        from_fn(name, move |_req, _res, _ctx| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push(name);
                Ok(())
            })
        })
    }

    async fn run(chain: &Chain, options: Options) -> (TesseraResult<bool>, Response) {
        let mut req = request();
        let mut res = Response::new();
        let mut ctx = Context::new(options);
        let outcome = run_chain(
            ChainLabel::Primary,
            &chain.share(),
            &mut req,
            &mut res,
            &mut ctx,
        )
        .await;
        (outcome, res)
    }

    #[tokio::test]
    async fn test_auto_advance_runs_every_middleware_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new()
            .with(recorder("a", &log))
            .with(recorder("b", &log))
            .with(recorder("c", &log));

        let (outcome, res) = run(&chain, Options::default()).await;

        assert!(!outcome.unwrap());
        assert!(!res.is_finalized());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_chain_is_not_aborted() {
        let (outcome, _) = run(&Chain::new(), Options::default()).await;
        assert!(!outcome.unwrap());
    }

    #[tokio::test]
    async fn test_done_stops_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new()
            .with(from_fn("stop", |_req, _res, ctx| {
                Box::pin(async move {
                    ctx.done();
                    ctx.done();
                    Ok(())
                })
            }))
            .with(recorder("after", &log));

        let (outcome, _) = run(&chain, Options::default()).await;

        assert!(outcome.unwrap());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_next_nests_the_rest_of_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer_log = Arc::clone(&log);
        let chain = Chain::new()
            .with(from_fn("outer", move |req, res, ctx| {
                let log = Arc::clone(&outer_log);
                Box::pin(async move {
                    log.lock().unwrap().push("outer:before");
                    ctx.next().run(req, res, ctx).await?;
                    log.lock().unwrap().push("outer:after");
                    Ok(())
                })
            }))
            .with(recorder("inner", &log));

        let (outcome, _) = run(&chain, Options::default()).await;

        assert!(!outcome.unwrap());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer:before", "inner", "outer:after"]
        );
    }

    #[tokio::test]
    async fn test_second_next_in_one_turn_is_a_no_op() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new()
            .with(from_fn("twice", |req, res, ctx| {
                Box::pin(async move {
                    let next = ctx.next();
                    next.clone().run(req, res, ctx).await?;
                    next.run(req, res, ctx).await?;
                    Ok(())
                })
            }))
            .with(recorder("b", &log))
            .with(recorder("c", &log));

        let (outcome, _) = run(&chain, Options::default()).await;

        assert!(!outcome.unwrap());
        assert_eq!(*log.lock().unwrap(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_finalize_aborts_when_call_done_on_end() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new()
            .with(from_fn("answer", |_req, res, _ctx| {
                Box::pin(async move {
                    res.send_text(StatusCode::FORBIDDEN, "no");
                    Ok(())
                })
            }))
            .with(recorder("after", &log));

        let (outcome, res) = run(&chain, Options::default()).await;

        assert!(outcome.unwrap());
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_finalize_does_not_abort_without_call_done_on_end() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new()
            .with(from_fn("answer", |_req, res, _ctx| {
                Box::pin(async move {
                    res.send_text(StatusCode::FORBIDDEN, "no");
                    Ok(())
                })
            }))
            .with(recorder("after", &log));

        let options = Options::new().with_call_done_on_end(false);
        let (outcome, _) = run(&chain, options).await;

        assert!(!outcome.unwrap());
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[tokio::test]
    async fn test_disabled_slot_is_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = Chain::new().with(recorder("a", &log));
        chain.push_optional(None::<crate::stages::RequestLogger>);
        chain.push(recorder("b", &log));

        let (outcome, _) = run(&chain, Options::default()).await;

        assert!(!outcome.unwrap());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_error_aborts_and_propagates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = Chain::new()
            .with(from_fn("fail", |_req, _res, _ctx| {
                Box::pin(async move { Err(tessera_core::TesseraError::internal("boom")) })
            }))
            .with(recorder("after", &log));

        let (outcome, _) = run(&chain, Options::default()).await;

        assert_eq!(outcome.unwrap_err().message(), "boom");
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_runtime_is_unbound_after_run() {
        let mut req = request();
        let mut res = Response::new();
        let mut ctx = Context::default();
        let chain = Chain::new().with(from_fn("probe", |_req, _res, ctx| {
            Box::pin(async move {
                assert_eq!(ctx.runtime().current_chain(), Some(ChainLabel::Primary));
                Ok(())
            })
        }));

        run_chain(ChainLabel::Primary, &chain.share(), &mut req, &mut res, &mut ctx)
            .await
            .unwrap();

        assert_eq!(ctx.runtime().current_chain(), None);
    }

    #[test]
    fn test_concat_preserves_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Chain::new().with(recorder("a", &log));
        let second = Chain::new().with(recorder("b", &log)).with(recorder("c", &log));

        let merged = first.concat(&second);
        assert_eq!(merged.names(), vec![Some("a"), Some("b"), Some("c")]);
        assert_eq!(first.len(), 1);
    }
}
