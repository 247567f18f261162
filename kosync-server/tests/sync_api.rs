//! API integration tests for kosync-server.
//!
//! These tests drive the KOReader sync protocol through the full router
//! against the in-memory storage backend and an in-memory library.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use axum::{
    body::Body,
    http::{header, request::Builder as RequestBuilder, Request, StatusCode},
    response::Response,
    Router,
};
use kosync_core::{
    compute_name_fingerprint, content_fingerprint_of_bytes, ByteSource, Fingerprint,
    FingerprintKind,
};
use kosync_server::{
    create_router, create_router_with_config, hash_key, AppState, Config, Database, Library,
    LibraryEntry, LibraryError, MemoryLibrary, User, KOREADER_CONTENT_TYPE,
};
use serde_json::{json, Value};
use tower::ServiceExt;

/// MD5("password"), what KOReader sends as `x-auth-key`
const KEY: &str = "5f4dcc3b5aa765d61d8327deb882cf99";

struct TestApp {
    db: Database,
    library: Arc<MemoryLibrary>,
    router: Router,
    alice: User,
}

async fn create_test_app() -> TestApp {
    let db = Database::in_memory();
    let library = Arc::new(MemoryLibrary::new(db.documents.clone()));
    let alice = db
        .users
        .upsert("alice", Some(&hash_key(KEY).unwrap()))
        .await
        .unwrap();
    let router = create_router(AppState::new(&db, library.clone()));
    TestApp {
        db,
        library,
        router,
        alice,
    }
}

fn authed(builder: RequestBuilder, user: &str, key: &str) -> RequestBuilder {
    builder.header("x-auth-user", user).header("x-auth-key", key)
}

async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn put_progress(body: Value) -> Request<Body> {
    authed(Request::builder(), "alice", KEY)
        .method("PUT")
        .uri("/sync/syncs/progress")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_progress(document: &str) -> Request<Body> {
    authed(Request::builder(), "alice", KEY)
        .uri(format!("/sync/syncs/progress/{document}"))
        .body(Body::empty())
        .unwrap()
}

fn assert_koreader_type(response: &Response) {
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        KOREADER_CONTENT_TYPE
    );
}

// ============================================================================
// Healthcheck & Authentication
// ============================================================================

#[tokio::test]
async fn test_healthcheck_needs_no_auth() {
    let app = create_test_app().await;

    let response = send(
        &app,
        Request::builder()
            .uri("/sync/healthcheck")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_koreader_type(&response);
    assert_eq!(json_body(response).await, json!({ "state": "OK" }));
}

#[tokio::test]
async fn test_auth_accepts_valid_key() {
    let app = create_test_app().await;

    let response = send(
        &app,
        authed(Request::builder(), "alice", KEY)
            .uri("/sync/users/auth")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_koreader_type(&response);
    assert_eq!(json_body(response).await, json!({ "authorized": "OK" }));
}

#[tokio::test]
async fn test_auth_rejects_bad_credentials() {
    let app = create_test_app().await;
    app.db.users.upsert("keyless", None).await.unwrap();

    let cases = [
        ("alice", "0000000000000000000000000000000"),
        ("mallory", KEY),
        ("keyless", KEY),
        ("alice", ""),
        ("", KEY),
    ];
    for (user, key) in cases {
        let response = send(
            &app,
            authed(Request::builder(), user, key)
                .uri("/sync/users/auth")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "user={user:?}");
        assert_koreader_type(&response);
        assert_eq!(json_body(response).await, json!({ "message": "Unauthorized" }));
    }
}

#[tokio::test]
async fn test_auth_rejects_missing_headers() {
    let app = create_test_app().await;

    let response = send(
        &app,
        Request::builder()
            .uri("/sync/users/auth")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unauthenticated_update_stores_nothing() {
    let app = create_test_app().await;

    let response = send(
        &app,
        authed(Request::builder(), "alice", "wrong")
            .method("PUT")
            .uri("/sync/syncs/progress")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "document": "abc", "progress": "1", "percentage": 0.1 }).to_string(),
            ))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let stored = app
        .db
        .progress
        .get(app.alice.id, &Fingerprint::from_client("abc"))
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn test_unauthenticated_get_is_rejected_without_resolving() {
    let app = create_test_app().await;
    app.library.add(&app.alice, "Dune.epub", b"spice".to_vec()).await.unwrap();
    let fingerprint = compute_name_fingerprint("Dune.epub").unwrap();
    let uri = format!("/sync/syncs/progress/{}", fingerprint.as_str());

    let requests = [
        Request::builder().uri(&uri).body(Body::empty()).unwrap(),
        authed(Request::builder(), "alice", "wrong")
            .uri(&uri)
            .body(Body::empty())
            .unwrap(),
    ];
    for request in requests {
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_koreader_type(&response);
        assert_eq!(json_body(response).await, json!({ "message": "Unauthorized" }));
    }

    assert_eq!(app.db.mappings.count(app.alice.id).await.unwrap(), 0);
}

// ============================================================================
// Progress
// ============================================================================

#[tokio::test]
async fn test_update_then_get_unresolved_fingerprint() {
    let app = create_test_app().await;
    let document = "0b229176d4e8db7f6d2b5a4952368d7a";

    let response = send(
        &app,
        put_progress(json!({
            "document": document,
            "progress": "/body/DocFragment[20]/body/p[22]/text().0",
            "percentage": 0.5,
            "device": "Kobo Libra 2",
            "device_id": "4AC3F6E1"
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_koreader_type(&response);
    let updated = json_body(response).await;
    assert_eq!(updated["document"], document);
    assert!(updated["timestamp"].as_i64().unwrap() > 0);

    let response = send(&app, get_progress(document)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_koreader_type(&response);
    let progress = json_body(response).await;

    assert_eq!(progress["document"], document);
    assert_eq!(progress["progress"], "/body/DocFragment[20]/body/p[22]/text().0");
    assert_eq!(progress["percentage"], "50.0");
    assert_eq!(progress["device"], "Kobo Libra 2");
    assert_eq!(progress["device_id"], "4AC3F6E1");
    assert_eq!(progress["timestamp"], updated["timestamp"]);
}

#[tokio::test]
async fn test_second_update_wins() {
    let app = create_test_app().await;

    for (progress, device) in [("10", "kobo"), ("20", "phone")] {
        let response = send(
            &app,
            put_progress(json!({
                "document": "abc",
                "progress": progress,
                "percentage": 0.2,
                "device": device,
                "device_id": device
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let progress = json_body(send(&app, get_progress("abc")).await).await;
    assert_eq!(progress["progress"], "20");
    assert_eq!(progress["device"], "phone");
}

#[tokio::test]
async fn test_missing_fields_default_on_read() {
    let app = create_test_app().await;

    let response = send(&app, put_progress(json!({ "document": "bare" }))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let progress = json_body(send(&app, get_progress("bare")).await).await;
    assert_eq!(progress["progress"], "");
    assert_eq!(progress["percentage"], "0.0");
    assert_eq!(progress["device"], "");
    assert_eq!(progress["device_id"], "");
}

#[tokio::test]
async fn test_update_without_document_is_bad_request() {
    let app = create_test_app().await;

    for body in [json!({ "progress": "1" }), json!({ "document": "" })] {
        let response = send(&app, put_progress(body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_koreader_type(&response);
        assert!(json_body(response).await["message"].is_string());
    }
}

#[tokio::test]
async fn test_update_with_malformed_body_is_bad_request() {
    let app = create_test_app().await;

    let response = send(
        &app,
        authed(Request::builder(), "alice", KEY)
            .method("PUT")
            .uri("/sync/syncs/progress")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_unknown_document_is_not_found() {
    let app = create_test_app().await;

    let response = send(&app, get_progress("ffffffffffffffffffffffffffffffff")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_koreader_type(&response);
    assert!(json_body(response).await["message"].is_string());
}

#[tokio::test]
async fn test_progress_is_isolated_per_user() {
    let app = create_test_app().await;
    app.db
        .users
        .upsert("bob", Some(&hash_key(KEY).unwrap()))
        .await
        .unwrap();

    send(&app, put_progress(json!({ "document": "shared", "progress": "a" }))).await;

    let response = send(
        &app,
        authed(Request::builder(), "bob", KEY)
            .uri("/sync/syncs/progress/shared")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Resolution through the protocol
// ============================================================================

#[tokio::test]
async fn test_update_resolves_library_document() {
    let app = create_test_app().await;
    let bytes = vec![7u8; 5000];
    let id = app.library.add(&app.alice, "novel.epub", bytes.clone()).await.unwrap();
    let fingerprint = content_fingerprint_of_bytes(&bytes).await.unwrap();

    let response = send(
        &app,
        put_progress(json!({ "document": fingerprint.as_str(), "percentage": 0.3 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        app.db.mappings.lookup_document(app.alice.id, &fingerprint).await.unwrap(),
        Some(id)
    );
}

#[tokio::test]
async fn test_get_resolves_but_still_reports_missing_progress() {
    let app = create_test_app().await;
    let id = app.library.add(&app.alice, "Dune.epub", b"spice".to_vec()).await.unwrap();
    let fingerprint = compute_name_fingerprint("Dune.epub").unwrap();

    let response = send(&app, get_progress(fingerprint.as_str())).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.db.mappings.lookup_document(app.alice.id, &fingerprint).await.unwrap(),
        Some(id)
    );
}

#[tokio::test]
async fn test_update_with_unknown_fingerprint_writes_no_mapping() {
    let app = create_test_app().await;
    app.library.add(&app.alice, "a.epub", b"aaa".to_vec()).await.unwrap();

    send(&app, put_progress(json!({ "document": "unmatched", "progress": "1" }))).await;

    assert_eq!(app.db.mappings.count(app.alice.id).await.unwrap(), 0);
    assert!(app
        .db
        .progress
        .get(app.alice.id, &Fingerprint::from_client("unmatched"))
        .await
        .unwrap()
        .is_some());
}

/// Library that counts how often it is listed
#[derive(Debug)]
struct CountingLibrary {
    inner: Arc<MemoryLibrary>,
    listings: AtomicUsize,
}

#[async_trait]
impl Library for CountingLibrary {
    async fn list_documents(&self, owner: &User) -> Result<Vec<LibraryEntry>, LibraryError> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        self.inner.list_documents(owner).await
    }

    async fn open(&self, entry: &LibraryEntry) -> Result<Box<dyn ByteSource>, LibraryError> {
        self.inner.open(entry).await
    }

    async fn ensure_document_record(
        &self,
        owner: &User,
        entry: &LibraryEntry,
    ) -> Result<i64, LibraryError> {
        self.inner.ensure_document_record(owner, entry).await
    }
}

#[tokio::test]
async fn test_mapped_fingerprint_is_not_rescanned() {
    let db = Database::in_memory();
    let inner = Arc::new(MemoryLibrary::new(db.documents.clone()));
    let alice = db
        .users
        .upsert("alice", Some(&hash_key(KEY).unwrap()))
        .await
        .unwrap();
    let id = inner.add(&alice, "Dune.epub", b"spice".to_vec()).await.unwrap();
    let fingerprint = compute_name_fingerprint("Dune.epub").unwrap();
    db.mappings
        .upsert(alice.id, &fingerprint, FingerprintKind::Name, id)
        .await
        .unwrap();

    let library = Arc::new(CountingLibrary {
        inner,
        listings: AtomicUsize::new(0),
    });
    let router = create_router(AppState::new(&db, library.clone()));

    for _ in 0..3 {
        let response = router
            .clone()
            .oneshot(get_progress(fingerprint.as_str()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
    let response = router
        .clone()
        .oneshot(put_progress(
            json!({ "document": fingerprint.as_str(), "percentage": 0.1 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(library.listings.load(Ordering::SeqCst), 0);

    // An unmapped fingerprint still triggers exactly one scan
    router.oneshot(get_progress("unmapped")).await.unwrap();
    assert_eq!(library.listings.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Docs
// ============================================================================

#[tokio::test]
async fn test_docs_are_opt_in() {
    let db = Database::in_memory();
    let library = Arc::new(MemoryLibrary::new(db.documents.clone()));

    let disabled = create_router(AppState::new(&db, library.clone()));
    let response = disabled
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let config = Config {
        enable_docs: true,
        ..Config::default()
    };
    let enabled = create_router_with_config(AppState::new(&db, library), &config);
    let response = enabled
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert!(doc["paths"]["/sync/syncs/progress"].is_object());
}
