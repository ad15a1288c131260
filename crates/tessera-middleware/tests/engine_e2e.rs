//! End-to-end engine tests.
//!
//! These tests drive complete requests through [`Engine`] and check the
//! observable contract:
//!
//! 1. Chain control - explicit `next`, auto-advance, `done`, finalize-abort
//! 2. Handler invocation and the `501` fallback
//! 3. Error pipeline - recovery, re-raise of original and new errors
//! 4. Composition - factory defaults merged with call-site overrides

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::StatusCode;
use tessera_core::{handler_fn, ErrorKind, Handler, Request, Response, TesseraError};
use tessera_middleware::stages::{ErrorMapper, RequestIdMiddleware, RequestLogger, REQUEST_ID_HEADER};
use tessera_middleware::{
    from_fn, Chain, ChainConfig, Context, Engine, EngineFactory, Middleware, Options,
    NOT_IMPLEMENTED_BODY,
};

type Log = Arc<Mutex<Vec<String>>>;

fn make_request(path: &str) -> Request {
    http::Request::builder()
        .method("GET")
        .uri(path)
        .body(Bytes::new())
        .unwrap()
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Records its name and lets the chain auto-advance.
fn record(name: &'static str, log: &Log) -> impl Middleware {
    let log = Arc::clone(log);
    from_fn(name, move |_req, _res, _ctx| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().unwrap().push(name.to_string());
            Ok(())
        })
    })
}

/// Records its name and finalizes the response with `status`.
fn answer(name: &'static str, status: StatusCode, log: &Log) -> impl Middleware {
    let log = Arc::clone(log);
    from_fn(name, move |_req, res, _ctx| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().unwrap().push(name.to_string());
            res.send_text(status, name);
            Ok(())
        })
    })
}

fn fail(name: &'static str, message: &'static str) -> impl Middleware {
    from_fn(name, move |_req, _res, _ctx| {
        Box::pin(async move { Err(TesseraError::internal(message)) })
    })
}

/// Records `handler` and finalizes with `200 OK`.
fn ok_handler(log: &Log) -> impl Handler {
    let log = Arc::clone(log);
    handler_fn(move |_req, res| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            log.lock().unwrap().push("handler".to_string());
            res.send_text(StatusCode::OK, "handled");
            Ok(())
        })
    })
}

fn finalize_counter() -> (RequestLogger, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let captured = Arc::clone(&count);
    let logger = RequestLogger::new().with_sink(move |_| {
        captured.fetch_add(1, Ordering::SeqCst);
    });
    (logger, count)
}

// ============================================================================
// Chain control
// ============================================================================

#[tokio::test]
async fn test_explicit_next_then_not_found_skips_handler() {
    let log = new_log();
    let a_log = Arc::clone(&log);
    let a = from_fn("a", move |req, res, ctx| {
        let log = Arc::clone(&a_log);
        Box::pin(async move {
            log.lock().unwrap().push("a".to_string());
            ctx.next().run(req, res, ctx).await
        })
    });

    let engine = Engine::run(
        ok_handler(&log),
        ChainConfig::new()
            .with_middleware(a)
            .with_middleware(answer("b", StatusCode::NOT_FOUND, &log)),
    );

    let mut req = make_request("/missing");
    let mut res = Response::new();
    engine.handle(&mut req, &mut res).await.unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(entries(&log), vec!["a", "b"]);
}

#[tokio::test]
async fn test_auto_advance_reaches_handler() {
    let log = new_log();
    let engine = Engine::builder()
        .handler(ok_handler(&log))
        .use_middleware(record("a", &log))
        .use_middleware(record("b", &log))
        .build();

    let mut req = make_request("/");
    let mut res = Response::new();
    engine.handle(&mut req, &mut res).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(entries(&log), vec!["a", "b", "handler"]);
}

#[tokio::test]
async fn test_done_skips_rest_and_handler_then_fallback() {
    let log = new_log();
    let engine = Engine::builder()
        .handler(ok_handler(&log))
        .use_middleware(from_fn("stop", |_req, _res, ctx| {
            Box::pin(async move {
                ctx.done();
                Ok(())
            })
        }))
        .use_middleware(record("after", &log))
        .build();

    let mut req = make_request("/");
    let mut res = Response::new();
    engine.handle(&mut req, &mut res).await.unwrap();

    assert!(entries(&log).is_empty());
    assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_next_twice_in_one_turn_runs_downstream_once() {
    let log = new_log();
    let engine = Engine::builder()
        .handler(ok_handler(&log))
        .use_middleware(from_fn("twice", |req, res, ctx| {
            Box::pin(async move {
                ctx.next().run(req, res, ctx).await?;
                ctx.next().run(req, res, ctx).await
            })
        }))
        .use_middleware(record("b", &log))
        .build();

    let mut req = make_request("/");
    let mut res = Response::new();
    engine.handle(&mut req, &mut res).await.unwrap();

    assert_eq!(entries(&log), vec!["b", "handler"]);
}

#[tokio::test]
async fn test_finalize_stops_chain_and_handler_by_default() {
    let log = new_log();
    let engine = Engine::builder()
        .handler(ok_handler(&log))
        .use_middleware(answer("deny", StatusCode::FORBIDDEN, &log))
        .use_middleware(record("after", &log))
        .build();

    let mut req = make_request("/");
    let mut res = Response::new();
    engine.handle(&mut req, &mut res).await.unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(entries(&log), vec!["deny"]);
}

#[tokio::test]
async fn test_without_call_done_on_end_every_middleware_runs() {
    let log = new_log();
    let engine = Engine::builder()
        .call_done_on_end(false)
        .handler(ok_handler(&log))
        .use_middleware(answer("early", StatusCode::ACCEPTED, &log))
        .use_middleware(record("b", &log))
        .use_middleware(record("c", &log))
        .build();

    let mut req = make_request("/");
    let mut res = Response::new();
    engine.handle(&mut req, &mut res).await.unwrap();

    assert_eq!(entries(&log), vec!["early", "b", "c", "handler"]);
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(res.body().as_ref(), b"early");
}

#[tokio::test]
async fn test_without_call_done_on_end_done_still_aborts() {
    let log = new_log();
    let engine = Engine::builder()
        .call_done_on_end(false)
        .handler(ok_handler(&log))
        .use_middleware(answer("early", StatusCode::ACCEPTED, &log))
        .use_middleware(from_fn("stop", |_req, _res, ctx| {
            Box::pin(async move {
                ctx.done();
                Ok(())
            })
        }))
        .use_middleware(record("c", &log))
        .build();

    let mut req = make_request("/");
    let mut res = Response::new();
    engine.handle(&mut req, &mut res).await.unwrap();

    assert_eq!(entries(&log), vec!["early"]);
}

// ============================================================================
// Handler and fallback
// ============================================================================

#[tokio::test]
async fn test_empty_chain_handler_answers_without_fallback() {
    let log = new_log();
    let (logger, finalized) = finalize_counter();
    let engine = Engine::builder()
        .handler(ok_handler(&log))
        .use_middleware(logger)
        .build();

    let mut req = make_request("/");
    let mut res = Response::new();
    engine.handle(&mut req, &mut res).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body().as_ref(), b"handled");
    assert_eq!(finalized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_handler_yields_fallback_exactly_once() {
    let (logger, finalized) = finalize_counter();
    let engine = Engine::without_handler(ChainConfig::new().with_middleware(logger));

    let mut req = make_request("/");
    let mut res = Response::new();
    engine.handle(&mut req, &mut res).await.unwrap();

    assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(res.body().as_ref(), NOT_IMPLEMENTED_BODY.as_bytes());
    assert_eq!(finalized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_double_finalize_fires_hooks_once() {
    let (logger, finalized) = finalize_counter();
    let engine = Engine::without_handler(
        ChainConfig::new()
            .with_middleware(logger)
            .with_middleware(from_fn("twice", |_req, res, _ctx| {
                Box::pin(async move {
                    assert!(res.send_text(StatusCode::OK, "first"));
                    assert!(!res.send_text(StatusCode::CONFLICT, "second"));
                    Ok(())
                })
            })),
    );

    let mut req = make_request("/");
    let mut res = Response::new();
    engine.handle(&mut req, &mut res).await.unwrap();

    assert_eq!(finalized.load(Ordering::SeqCst), 1);
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body().as_ref(), b"first");
}

// ============================================================================
// Error pipeline
// ============================================================================

#[tokio::test]
async fn test_error_chain_recovers_and_sees_original_error() {
    let seen = Arc::new(Mutex::new(None::<String>));
    let captured = Arc::clone(&seen);
    let recover = from_fn("recover", move |_req, res, ctx| {
        let seen = Arc::clone(&captured);
        Box::pin(async move {
            *seen.lock().unwrap() = ctx.error().map(|err| err.message().to_string());
            res.end_with(StatusCode::from_u16(555).unwrap(), "recovered");
            Ok(())
        })
    });

    let engine = Engine::without_handler(
        ChainConfig::new()
            .with_middleware(fail("boom", "boom"))
            .with_error_middleware(recover),
    );

    let mut req = make_request("/");
    let mut res = Response::new();
    engine.handle(&mut req, &mut res).await.unwrap();

    assert_eq!(res.status().as_u16(), 555);
    assert_eq!(seen.lock().unwrap().as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_handler_error_reaches_error_chain() {
    let engine = Engine::run(
        handler_fn(|_req, _res| {
            Box::pin(async move { Err(TesseraError::not_found("no such order")) })
        }),
        ChainConfig::new()
            .with_middleware(RequestIdMiddleware::new())
            .with_error_middleware(ErrorMapper::new()),
    );

    let mut req = make_request("/orders/7");
    let mut res = Response::new();
    let mut ctx = Context::new(engine.options().clone());
    engine
        .handle_with_context(&mut req, &mut res, &mut ctx)
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(ctx.error().map(TesseraError::kind), Some(ErrorKind::NotFound));

    let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    let header = res.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["request_id"], header);
}

#[tokio::test]
async fn test_error_without_error_chain_is_raised() {
    let engine = Engine::without_handler(ChainConfig::new().with_middleware(fail("boom", "boom")));

    let mut req = make_request("/");
    let mut res = Response::new();
    let err = engine.handle(&mut req, &mut res).await.unwrap_err();

    assert_eq!(err.message(), "boom");
    assert!(!res.is_finalized());
}

#[tokio::test]
async fn test_failing_error_chain_raises_new_error() {
    let engine = Engine::without_handler(
        ChainConfig::new()
            .with_middleware(fail("boom", "boom"))
            .with_error_middleware(fail("broken", "error handler broke")),
    );

    let mut req = make_request("/");
    let mut res = Response::new();
    let err = engine.handle(&mut req, &mut res).await.unwrap_err();

    assert_eq!(err.message(), "error handler broke");
}

#[tokio::test]
async fn test_error_chain_leaving_response_open_raises_original() {
    let log = new_log();
    let engine = Engine::without_handler(
        ChainConfig::new()
            .with_middleware(fail("boom", "boom"))
            .with_error_middleware(record("observe", &log)),
    );

    let mut req = make_request("/");
    let mut res = Response::new();
    let err = engine.handle(&mut req, &mut res).await.unwrap_err();

    assert_eq!(err.message(), "boom");
    assert_eq!(entries(&log), vec!["observe"]);
    assert!(!res.is_finalized());
}

#[tokio::test]
async fn test_error_chain_finalize_stops_remaining_error_middleware() {
    let log = new_log();
    let engine = Engine::without_handler(
        ChainConfig::new()
            .with_middleware(fail("boom", "boom"))
            .with_error_middleware(ErrorMapper::new())
            .with_error_middleware(record("after_mapper", &log)),
    );

    let mut req = make_request("/");
    let mut res = Response::new();
    engine.handle(&mut req, &mut res).await.unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(entries(&log).is_empty());
}

// ============================================================================
// Composition
// ============================================================================

#[tokio::test]
async fn test_factory_runs_defaults_before_overrides() {
    let log = new_log();
    let factory = EngineFactory::new(
        ChainConfig::new()
            .with_middleware(record("default", &log))
            .with_options(Options::new().with("tier", "gold")),
    );

    let tier_log = Arc::clone(&log);
    let read_tier = from_fn("read_tier", move |_req, _res, ctx| {
        let log = Arc::clone(&tier_log);
        Box::pin(async move {
            let tier = ctx.options().get_as::<String>("tier").unwrap_or_default();
            log.lock().unwrap().push(format!("tier={tier}"));
            Ok(())
        })
    });

    let engine = factory.engine(
        ok_handler(&log),
        ChainConfig::new()
            .with_chain(Chain::new().with(record("call_site", &log)).with(read_tier))
            .with_options(Options::new().with("tier", "platinum")),
    );

    let mut req = make_request("/");
    let mut res = Response::new();
    engine.handle(&mut req, &mut res).await.unwrap();

    assert_eq!(
        entries(&log),
        vec!["default", "call_site", "tier=platinum", "handler"]
    );
}

#[tokio::test]
async fn test_shared_engine_serves_concurrent_requests() {
    let engine = Arc::new(
        Engine::builder()
            .use_middleware(RequestIdMiddleware::new())
            .handler(handler_fn(|req, res| {
                Box::pin(async move {
                    tokio::task::yield_now().await;
                    res.send_text(StatusCode::OK, req.uri().path().to_string());
                    Ok(())
                })
            }))
            .build(),
    );

    let mut tasks = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            let mut req = make_request(&format!("/item/{i}"));
            let mut res = Response::new();
            engine.handle(&mut req, &mut res).await.unwrap();
            (i, res)
        }));
    }

    for task in tasks {
        let (i, res) = task.await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), format!("/item/{i}").as_bytes());
    }
}
