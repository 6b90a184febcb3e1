use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use lattice_core::{Context, Error, HttpRequest, HttpResponse, RecoveryMiddleware, Router};
use lattice_session::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const NAME: &str = "sid";

fn request() -> Context {
    Context::new(HttpRequest::new("GET", "/"))
}

fn request_with(value: &str) -> Context {
    Context::new(HttpRequest::new("GET", "/").with_cookie(NAME, value))
}

fn cookie_value(response: &HttpResponse) -> String {
    response
        .cookie(NAME)
        .map(|c| c.value.clone())
        .expect("session cookie should be set")
}

/// Save a fresh session holding `values` and return the cookie value.
async fn save_new(store: &dyn SessionStore, values: &[(&str, SessionValue)]) -> String {
    let ctx = request();
    let mut session = store.new(&ctx, NAME).await.unwrap();
    for (key, value) in values {
        session.set(*key, value.clone());
    }
    store.save(&ctx, &mut session).await.unwrap();
    cookie_value(&ctx.take_response())
}

fn cookie_store() -> CookieStore {
    CookieStore::new(&CookieStore::generate_key(KeySize::Aes256)).unwrap()
}

// ========== Memory store ==========

#[tokio::test(start_paused = true)]
async fn test_memory_round_trip_within_max_age() {
    let config = SessionConfig::default()
        .with_cookie_name(NAME)
        .with_cookie_options(CookieOptions::default().with_max_age(60));
    let store = MemoryStore::new(config).unwrap();

    let id = save_new(&store, &[("user", SessionValue::from("alice"))]).await;

    tokio::time::advance(Duration::from_secs(30)).await;

    let session = store.get(&request_with(&id), NAME).await.unwrap();
    assert_eq!(session.id, id);
    assert!(!session.is_new);
    assert_eq!(session.get("user").and_then(SessionValue::as_str), Some("alice"));
}

#[tokio::test(start_paused = true)]
async fn test_memory_expired_session_is_not_found() {
    let config =
        SessionConfig::default().with_cookie_options(CookieOptions::default().with_max_age(1));
    let store = MemoryStore::new(config).unwrap();

    let id = save_new(&store, &[("k", SessionValue::from(1))]).await;

    tokio::time::advance(Duration::from_secs(2)).await;

    let err = store.get(&request_with(&id), NAME).await.unwrap_err();
    assert_eq!(err, SessionError::NotFound);
}

#[tokio::test(start_paused = true)]
async fn test_memory_resave_extends_expiry() {
    let config =
        SessionConfig::default().with_cookie_options(CookieOptions::default().with_max_age(10));
    let store = MemoryStore::new(config).unwrap();
    let id = save_new(&store, &[("k", SessionValue::from(1))]).await;

    tokio::time::advance(Duration::from_secs(8)).await;
    let ctx = request_with(&id);
    let mut session = store.get(&ctx, NAME).await.unwrap();
    store.save(&ctx, &mut session).await.unwrap();
    assert_eq!(session.id, id);

    tokio::time::advance(Duration::from_secs(8)).await;
    assert!(store.get(&request_with(&id), NAME).await.is_ok());
}

#[tokio::test]
async fn test_memory_default_cookie_has_no_max_age() {
    let store = MemoryStore::new(SessionConfig::default()).unwrap();
    let ctx = request();
    let mut session = store.new(&ctx, NAME).await.unwrap();
    session.set("k", true);
    store.save(&ctx, &mut session).await.unwrap();

    let response = ctx.take_response();
    let cookie = response.cookie(NAME).unwrap();
    assert_eq!(cookie.max_age, None);
    assert!(cookie.http_only);
    assert_eq!(cookie.path.as_deref(), Some("/"));
}

// ========== Cookie store ==========

#[tokio::test]
async fn test_cookie_round_trip() {
    let store = cookie_store();
    let value = save_new(
        &store,
        &[
            ("user_id", SessionValue::from(42)),
            ("name", SessionValue::from("alice")),
            ("admin", SessionValue::from(false)),
        ],
    )
    .await;

    let session = store.get(&request_with(&value), NAME).await.unwrap();
    assert!(session.id.is_empty());
    assert!(!session.is_new);
    assert_eq!(session.get("user_id").and_then(SessionValue::as_i64), Some(42));
    assert_eq!(session.get("name").and_then(SessionValue::as_str), Some("alice"));
    assert_eq!(session.get("admin").and_then(SessionValue::as_bool), Some(false));
}

#[tokio::test]
async fn test_cookie_round_trip_all_key_sizes() {
    for size in [KeySize::Aes128, KeySize::Aes192, KeySize::Aes256] {
        let store = CookieStore::new(&CookieStore::generate_key(size)).unwrap();
        let value = save_new(&store, &[("k", SessionValue::from("v"))]).await;
        let session = store.get(&request_with(&value), NAME).await.unwrap();
        assert_eq!(session.get("k"), Some(&SessionValue::from("v")), "{:?}", size);
    }
}

#[tokio::test]
async fn test_cookie_wrong_key_is_not_found() {
    let writer = cookie_store();
    let reader = cookie_store();
    let value = save_new(&writer, &[("k", SessionValue::from(1))]).await;

    let err = reader.get(&request_with(&value), NAME).await.unwrap_err();
    assert_eq!(err, SessionError::NotFound);
}

#[tokio::test]
async fn test_cookie_any_flipped_byte_is_not_found() {
    let store = cookie_store();
    let value = save_new(&store, &[("role", SessionValue::from("user"))]).await;
    let bytes = URL_SAFE_NO_PAD.decode(&value).unwrap();

    for i in 0..bytes.len() {
        let mut tampered = bytes.clone();
        tampered[i] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(&tampered);

        let err = store.get(&request_with(&tampered), NAME).await.unwrap_err();
        assert_eq!(err, SessionError::NotFound, "flipped byte {}", i);
    }
}

#[tokio::test]
async fn test_cookie_malformed_values_are_not_found() {
    let store = cookie_store();
    for value in ["", "!!!", "c2hvcnQ", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"] {
        let err = store.get(&request_with(value), NAME).await.unwrap_err();
        assert_eq!(err, SessionError::NotFound, "value {:?}", value);
    }
    assert_eq!(
        store.get(&request(), NAME).await.unwrap_err(),
        SessionError::NotFound
    );
}

#[tokio::test]
async fn test_cookie_oversized_payload_writes_no_cookie() {
    let store = cookie_store().with_max_cookie_size(256);
    let ctx = request();
    let mut session = store.new(&ctx, NAME).await.unwrap();
    session.set("blob", "x".repeat(1024));

    let err = store.save(&ctx, &mut session).await.unwrap_err();
    assert!(matches!(err, SessionError::PayloadTooLarge { limit: 256, .. }));
    assert!(ctx.take_response().cookie(NAME).is_none());
}

#[tokio::test]
async fn test_cookie_non_finite_float_is_rejected_on_save() {
    let store = cookie_store();
    let value = save_new(&store, &[("user", SessionValue::from("alice"))]).await;

    let ctx = request_with(&value);
    let mut session = store.get(&ctx, NAME).await.unwrap();
    session.set("score", f64::NAN);

    let err = store.save(&ctx, &mut session).await.unwrap_err();
    assert!(matches!(err, SessionError::Serialization(_)));
    assert!(ctx.take_response().cookie(NAME).is_none());

    // The previously issued cookie still holds the session.
    let session = store.get(&request_with(&value), NAME).await.unwrap();
    assert_eq!(session.get("user").and_then(SessionValue::as_str), Some("alice"));

    // Finite floats round-trip.
    let value = save_new(&store, &[("score", SessionValue::from(0.5))]).await;
    let session = store.get(&request_with(&value), NAME).await.unwrap();
    assert_eq!(session.get("score").and_then(SessionValue::as_f64), Some(0.5));
}

#[tokio::test]
async fn test_cookie_default_budget_is_4096() {
    let store = cookie_store();
    assert_eq!(store.max_cookie_size(), 4096);

    let ctx = request();
    let mut session = store.new(&ctx, NAME).await.unwrap();
    session.set("blob", "x".repeat(4096));
    assert!(matches!(
        store.save(&ctx, &mut session).await,
        Err(SessionError::PayloadTooLarge { .. })
    ));
}

#[tokio::test]
async fn test_cookie_empty_session_expires_cookie() {
    let store = cookie_store();
    let ctx = request();
    let mut session = store.new(&ctx, NAME).await.unwrap();
    store.save(&ctx, &mut session).await.unwrap();

    let response = ctx.take_response();
    let cookie = response.cookie(NAME).unwrap();
    assert!(cookie.is_removal());
    assert!(cookie.value.is_empty());
}

#[tokio::test]
async fn test_cookie_removal_options_expire_cookie() {
    let store = cookie_store();
    let ctx = request();
    let mut session = store.new(&ctx, NAME).await.unwrap();
    session.set("k", 1);
    session.options = CookieOptions::default().with_max_age(-1);
    store.save(&ctx, &mut session).await.unwrap();

    assert!(ctx.take_response().cookie(NAME).unwrap().is_removal());
}

// ========== Concurrency ==========

async fn assert_isolated(store: Arc<dyn SessionStore>) {
    let mut tasks = Vec::new();
    for i in 0..32 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let marker = format!("marker-{}", i);
            let value = save_new(store.as_ref(), &[("marker", SessionValue::from(marker.clone()))]).await;
            tokio::task::yield_now().await;
            let session = store.get(&request_with(&value), NAME).await.unwrap();
            assert_eq!(
                session.get("marker").and_then(SessionValue::as_str),
                Some(marker.as_str())
            );
            value
        }));
    }

    let mut cookies = Vec::new();
    for task in tasks {
        cookies.push(task.await.unwrap());
    }
    cookies.sort();
    cookies.dedup();
    assert_eq!(cookies.len(), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_concurrent_isolation() {
    let store = Arc::new(MemoryStore::new(SessionConfig::default()).unwrap());
    assert_isolated(store.clone()).await;
    assert_eq!(store.len(), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cookie_concurrent_isolation() {
    assert_isolated(Arc::new(cookie_store())).await;
}

// ========== Middleware ==========

fn counter_router(store: Arc<dyn SessionStore>) -> Router {
    let mut router = Router::new();
    router.add_middleware(RecoveryMiddleware::new());
    router.add_middleware(SessionMiddleware::new(store, NAME));

    router
        .get("/count", |ctx: Context| async move {
            let session = ctx.session()?;
            let count = session.get("count").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
            session.set("count", count);
            ctx.text(count.to_string());
            Ok(())
        })
        .unwrap();

    router
        .get("/fail", |ctx: Context| async move {
            ctx.session()?.set("failed", true);
            Err(Error::handler("failure"))
        })
        .unwrap();

    router
        .get("/logout", |ctx: Context| async move {
            let session = ctx.session()?;
            session.set_options(session.options().with_max_age(0));
            ctx.text("bye");
            Ok(())
        })
        .unwrap();

    router
}

async fn count_three_times(router: &Router) -> String {
    let first = router.serve(HttpRequest::new("GET", "/count")).await;
    assert_eq!(first.body_str(), "1");
    let mut cookie = cookie_value(&first);

    for expected in ["2", "3"] {
        let response = router
            .serve(HttpRequest::new("GET", "/count").with_cookie(NAME, &cookie))
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body_str(), expected);
        cookie = cookie_value(&response);
    }
    cookie
}

#[tokio::test]
async fn test_middleware_counter_with_memory_store() {
    let store = Arc::new(MemoryStore::new(SessionConfig::default()).unwrap());
    let router = counter_router(store.clone());

    let cookie = count_three_times(&router).await;
    assert_eq!(store.len(), 1);

    let response = router
        .serve(HttpRequest::new("GET", "/logout").with_cookie(NAME, &cookie))
        .await;
    assert!(response.cookie(NAME).unwrap().is_removal());
    assert!(store.is_empty());

    let response = router
        .serve(HttpRequest::new("GET", "/count").with_cookie(NAME, &cookie))
        .await;
    assert_eq!(response.body_str(), "1");
}

#[tokio::test]
async fn test_middleware_counter_with_cookie_store() {
    let router = counter_router(Arc::new(cookie_store()));
    count_three_times(&router).await;
}

#[tokio::test]
async fn test_middleware_saves_on_handler_error() {
    let store = Arc::new(MemoryStore::new(SessionConfig::default()).unwrap());
    let router = counter_router(store.clone());

    let response = router.serve(HttpRequest::new("GET", "/fail")).await;
    assert_eq!(response.status, 500);
    assert_eq!(store.len(), 1);

    let cookie = cookie_value(&response);
    let session = store.get(&request_with(&cookie), NAME).await.unwrap();
    assert_eq!(session.get("failed"), Some(&SessionValue::Bool(true)));
}

#[tokio::test]
async fn test_middleware_replaces_tampered_cookie_with_new_session() {
    let router = counter_router(Arc::new(cookie_store()));

    let response = router
        .serve(HttpRequest::new("GET", "/count").with_cookie(NAME, "forged"))
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body_str(), "1");
}

#[tokio::test]
async fn test_handler_without_middleware_gets_internal_error() {
    let router = Router::new();
    router
        .get("/", |ctx: Context| async move {
            ctx.session()?;
            Ok(())
        })
        .unwrap();

    let response = router.serve(HttpRequest::new("GET", "/")).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body_str(), "Internal Server Error");
}
