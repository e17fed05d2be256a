//! End-to-end routing through manager → service → descriptor trees.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use switchyard_core::{
    BoxError, Exchange, Headers, MemoryExchange, SessionContext, StatusCode, json, names,
};
use switchyard_framework::descriptors::{general_error, not_found_post};
use switchyard_framework::{
    CorsConfig, Descriptor, Invocation, PostDescriptor, PreDescriptor, Service, ServiceManager,
};

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn counting(count: &Arc<AtomicUsize>) -> Descriptor {
    let count = count.clone();
    Descriptor::new(move |_: Invocation| {
        let count = count.clone();
        async move {
            count.fetch_add(1, Ordering::SeqCst);
        }
    })
}

async fn dispatch(root: &ServiceManager, stream: &Arc<MemoryExchange>, headers: Headers) {
    root.handle(
        Exchange::new(stream.clone()),
        Arc::new(headers),
        0,
        &SessionContext::default(),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn two_level_tree_consumes_then_matches_exactly() {
    let seen = Arc::new(Mutex::new(None));
    let seen_clone = seen.clone();

    let service = Service::new("route").unwrap().descriptor(
        "123",
        Descriptor::new(move |inv: Invocation| {
            let seen = seen_clone.clone();
            async move {
                *seen.lock() = Some((
                    inv.headers.get("route").map(str::to_string),
                    inv.context.processed_header("route"),
                ));
                inv.exchange.respond_status(StatusCode::OK)
            }
        }),
    );
    let root = ServiceManager::with_pattern("route", "^([a-z]+)/")
        .unwrap()
        .service("users", service);
    let stream = MemoryExchange::new(1);

    dispatch(&root, &stream, Headers::from([("route", "users/123")])).await;

    let (raw, processed) = seen.lock().clone().unwrap();
    assert_eq!(raw.as_deref(), Some("users/123"));
    assert_eq!(processed.as_deref(), Some("123"));
    assert_eq!(stream.status(), Some(StatusCode::OK));
}

#[tokio::test]
async fn nested_managers_consume_successive_segments() {
    let users = counter();
    let fallback = counter();

    let api = ServiceManager::with_pattern(":path", "^/([a-z]+)")
        .unwrap()
        .service(
            "users",
            Service::with_pattern(":path", "^/(\\d+)$")
                .unwrap()
                .descriptor("42", counting(&users)),
        );
    let root = ServiceManager::with_pattern(":path", "^/([a-z]+)")
        .unwrap()
        .sub_manager("api", api)
        .service("", Service::new(":method").unwrap().descriptor("", counting(&fallback)));

    dispatch(&root, &MemoryExchange::new(1), Headers::from([(":path", "/api/users/42")])).await;
    dispatch(&root, &MemoryExchange::new(2), Headers::from([(":path", "/static/app.js")])).await;

    assert_eq!(users.load(Ordering::SeqCst), 1);
    assert_eq!(fallback.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn search_params_survive_repeated_extraction() {
    let seen = Arc::new(Mutex::new(None));
    let seen_clone = seen.clone();

    let leaf = Service::new(":method").unwrap().descriptor(
        "",
        Descriptor::new(move |inv: Invocation| {
            let seen = seen_clone.clone();
            async move {
                *seen.lock() = Some((
                    inv.context.processed_header(":path"),
                    inv.context.search_params(),
                ));
                inv.exchange.respond_status(StatusCode::OK)
            }
        }),
    );
    let api = ServiceManager::with_pattern(":path", "^/([a-z]+)")
        .unwrap()
        .with_cors(CorsConfig::default())
        .service("users", leaf);
    let root = ServiceManager::with_pattern(":path", "^/([a-z]+)")
        .unwrap()
        .with_cors(CorsConfig::default())
        .sub_manager("api", api);
    let stream = MemoryExchange::new(1);

    dispatch(
        &root,
        &stream,
        Headers::from([(":method", "GET"), (":path", "/api/users/42?a=1&a=2")]),
    )
    .await;

    let (path, params) = seen.lock().clone().unwrap();
    assert_eq!(path.as_deref(), Some("/42?a=1&a=2"));
    assert_eq!(params.len(), 1);
    assert_eq!(params.get("a").map(String::as_str), Some("2"));
    assert_eq!(stream.status(), Some(StatusCode::OK));
}

#[tokio::test]
async fn unmatched_pattern_answers_once_and_stops() {
    let invoked = counter();
    let root = ServiceManager::with_pattern("route", "^([a-z]+)/")
        .unwrap()
        .service("", Service::new("route").unwrap().descriptor("", counting(&invoked)));
    let stream = MemoryExchange::new(1);

    dispatch(&root, &stream, Headers::from([("route", "123")])).await;

    assert_eq!(stream.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(stream.response_count(), 1);
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_marker_without_default_routes_nowhere() {
    let invoked = counter();
    let root = ServiceManager::new("x-service")
        .unwrap()
        .service("users", Service::new("x-action").unwrap().descriptor("", counting(&invoked)));
    let stream = MemoryExchange::new(1);

    dispatch(&root, &stream, Headers::from([("x-service", "orders")])).await;

    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(stream.response_count(), 0);
}

#[tokio::test]
async fn cors_preflight_skips_descendants() {
    let invoked = counter();
    let root = ServiceManager::new("x-service")
        .unwrap()
        .with_cors(CorsConfig::default())
        .service("", Service::new("x-action").unwrap().descriptor("", counting(&invoked)));
    let stream = MemoryExchange::new(1);

    dispatch(&root, &stream, Headers::from([(":method", "OPTIONS")])).await;

    let head = stream.response().unwrap();
    assert_eq!(head.status, StatusCode::OK);
    assert_eq!(head.headers.get(names::ACCESS_CONTROL_ALLOW_ORIGIN), Some("*"));
    assert!(stream.is_ended());
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn done_short_circuits_pre_steps_but_not_main_or_post() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let step = |label: &'static str| {
        let log = log.clone();
        move |_: Invocation| {
            let log = log.clone();
            async move { log.lock().push(label) }
        }
    };

    let descriptor = Descriptor::new(step("main"))
        .pre(PreDescriptor::new(step("pre1")))
        .pre(PreDescriptor::new(|inv: Invocation| async move {
            inv.context.set("done", true);
            inv.context.set("done", false);
        }))
        .pre(PreDescriptor::new(step("pre3")))
        .post(PostDescriptor::new(step("post1")))
        .post(PostDescriptor::new(step("post2")));
    let root = ServiceManager::new("x-service")
        .unwrap()
        .service("", Service::new("x-action").unwrap().descriptor("", descriptor));

    dispatch(&root, &MemoryExchange::new(1), Headers::new()).await;

    assert_eq!(*log.lock(), ["pre1", "main", "post1", "post2"]);
}

#[tokio::test]
async fn session_data_is_shared_across_exchanges() {
    let root = ServiceManager::new("x-service").unwrap().service(
        "",
        Service::new("x-action").unwrap().descriptor(
            "",
            Descriptor::new(|inv: Invocation| async move {
                let visits = inv
                    .context
                    .session_data()
                    .get("visits")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                inv.context.set("sessionData", json!({ "visits": visits + 1 }));
            }),
        ),
    );
    let session = SessionContext::default();

    for id in 1..=3 {
        root.handle(
            Exchange::new(MemoryExchange::new(id)),
            Arc::new(Headers::new()),
            0,
            &session,
        )
        .await
        .unwrap();
    }

    assert_eq!(session.get("visits"), Some(json!(3)));
}

#[tokio::test]
async fn error_steps_and_not_found_fallback() {
    let root = ServiceManager::with_pattern(":path", "^/([a-z]+)")
        .unwrap()
        .service(
            "fail",
            Service::new(":method")
                .unwrap()
                .descriptor(
                    "",
                    Descriptor::new(|_: Invocation| async {
                        Err::<(), BoxError>("handler exploded".into())
                    }),
                )
                .on_error(general_error()),
        )
        .service(
            "",
            Service::new(":method")
                .unwrap()
                .always_exec_pre_descriptors(true)
                .post(not_found_post()),
        );

    let failing = MemoryExchange::new(1);
    dispatch(&root, &failing, Headers::from([(":path", "/fail")])).await;
    assert_eq!(failing.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));

    let missing = MemoryExchange::new(2);
    dispatch(&root, &missing, Headers::from([(":path", "/nothing")])).await;
    assert_eq!(missing.status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn unrecovered_errors_reach_the_caller() {
    let root = ServiceManager::new("x-service").unwrap().service(
        "",
        Service::new("x-action").unwrap().descriptor(
            "",
            Descriptor::new(|_: Invocation| async { Err::<(), BoxError>("nobody catches".into()) }),
        ),
    );

    let err = root
        .handle(
            Exchange::new(MemoryExchange::new(1)),
            Arc::new(Headers::new()),
            0,
            &SessionContext::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "nobody catches");
}
