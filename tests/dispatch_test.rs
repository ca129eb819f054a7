//! Routing contexts, filters and re-dispatch over real HTTP.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_server_factory::routing::DispatchOrigin;
use http_server_factory::{
    filter_fn, handler_fn, DispatchType, Dispatcher, FilterChain, FilterTable, RouteTable,
    StartOptions,
};

mod common;

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(name: &'static str, log: Log) -> impl http_server_factory::Filter {
    filter_fn(move |req: Request<Body>, chain: FilterChain| {
        log.lock()
            .unwrap()
            .push(format!("{name}:{}:{}", DispatchType::of(&req), req.uri().path()));
        chain.proceed(req)
    })
}

fn redispatching_routes() -> RouteTable {
    RouteTable::new()
        .route("/target/*", handler_fn(|req: Request<Body>| async move {
            let origin = req
                .extensions()
                .get::<DispatchOrigin>()
                .map(|o| o.0.path().to_string())
                .unwrap_or_default();
            format!("{} via {}", req.uri().path(), origin)
        }))
        .route("/entry/*", handler_fn(|req: Request<Body>| async move {
            let dispatcher = Dispatcher::from_request(&req).unwrap();
            let path = req.uri().path().to_owned();
            match path.as_str() {
                "/entry/forward" => dispatcher.forward("/target/f", req).await,
                "/entry/include" => dispatcher.include("/target/i", req).await,
                "/entry/async" => dispatcher.dispatch_async("/target/a", req).await,
                _ => dispatcher.error(StatusCode::SERVICE_UNAVAILABLE, "/target/e", req).await,
            }
        }))
}

#[test]
fn test_filters_see_every_dispatch_type() {
    let log: Log = Arc::default();
    let options = StartOptions::new(redispatching_routes())
        .with_filters(FilterTable::new().filter("/target/*", recorder("f", log.clone())));

    let registry = common::registry(common::local_config(&["api"]));
    registry.start("api", options).unwrap();
    let addr = common::addr_of(&registry, "api");

    assert_eq!(
        common::get(addr, "/target/direct"),
        (200, "/target/direct via ".to_string())
    );
    assert_eq!(
        common::get(addr, "/entry/forward"),
        (200, "/target/f via /entry/forward".to_string())
    );
    assert_eq!(
        common::get(addr, "/entry/include"),
        (200, "/target/i via /entry/include".to_string())
    );
    assert_eq!(
        common::get(addr, "/entry/async"),
        (200, "/target/a via /entry/async".to_string())
    );
    assert_eq!(
        common::get(addr, "/entry/error"),
        (503, "/target/e via /entry/error".to_string())
    );

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "f:request:/target/direct",
            "f:forward:/target/f",
            "f:include:/target/i",
            "f:async:/target/a",
            "f:error:/target/e",
        ]
    );
}

#[test]
fn test_every_filter_attached_to_every_context_in_order() {
    let log: Log = Arc::default();
    let routes = RouteTable::new()
        .route("/a/*", handler_fn(|_req| async { "a" }))
        .route("/b/*", handler_fn(|_req| async { "b" }));
    let filters = FilterTable::new()
        .filter("/*", recorder("first", log.clone()))
        .filter("/*", recorder("second", log.clone()))
        .filter("/b/*", recorder("only-b", log.clone()));

    let registry = common::registry(common::local_config(&["api"]));
    registry
        .start("api", StartOptions::new(routes).with_filters(filters))
        .unwrap();
    let addr = common::addr_of(&registry, "api");

    assert_eq!(common::get(addr, "/a/x"), (200, "a".to_string()));
    assert_eq!(common::get(addr, "/b/y"), (200, "b".to_string()));

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "first:request:/a/x",
            "second:request:/a/x",
            "first:request:/b/y",
            "second:request:/b/y",
            "only-b:request:/b/y",
        ]
    );
}

#[test]
fn test_filter_can_answer_without_handler() {
    let routes = RouteTable::new().route("/*", handler_fn(|_req| async { "open" }));
    let filters = FilterTable::new().filter(
        "/private/*",
        filter_fn(|_req: Request<Body>, _chain: FilterChain| async { StatusCode::FORBIDDEN }),
    );

    let registry = common::registry(common::local_config(&["api"]));
    registry
        .start("api", StartOptions::new(routes).with_filters(filters))
        .unwrap();
    let addr = common::addr_of(&registry, "api");

    assert_eq!(common::get(addr, "/public"), (200, "open".to_string()));
    assert_eq!(common::get(addr, "/private/data").0, 403);
}

#[test]
fn test_oversized_request_headers_rejected() {
    let mut config = common::local_config(&["api"]);
    config.set("api.http.requestHeaderSize", 512);
    let registry = common::registry(config);
    registry
        .start("api", StartOptions::new(common::hello_routes("hello")))
        .unwrap();
    let addr = common::addr_of(&registry, "api");

    assert_eq!(common::get(addr, "/hello"), (200, "hello".to_string()));

    let response = common::client()
        .get(common::url("http", addr, "/hello"))
        .header("x-padding", "p".repeat(1024))
        .send()
        .unwrap();
    assert_eq!(response.status().as_u16(), 431);
}

#[test]
fn test_suffix_and_exact_routes() {
    let routes = RouteTable::new()
        .route("/status", handler_fn(|_req| async { "status" }))
        .route("*.json", handler_fn(|_req| async { "json" }))
        .route("/", handler_fn(|_req| async { "default" }));

    let registry = common::registry(common::local_config(&["api"]));
    registry.start("api", StartOptions::new(routes)).unwrap();
    let addr = common::addr_of(&registry, "api");

    assert_eq!(common::get(addr, "/status"), (200, "status".to_string()));
    assert_eq!(common::get(addr, "/reports/q1.json"), (200, "json".to_string()));
    assert_eq!(common::get(addr, "/anything"), (200, "default".to_string()));
}
