//! HTTP contract tests: the full router over in-memory providers.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::Utc;
use flashgate_core::providers::{DeadLetter, DeadLetterSink};
use flashgate_core::{AccessPolicy, Endpoint, FlashSaleSettings, Item, ItemId, PurchaseRequest, UserId};
use flashgate_runtime::{FlashSale, Providers};
use flashgate_testing::fixtures::{open_item, upcoming_window};
use flashgate_testing::mocks::{
    InMemoryChallengeStore, InMemoryDispatchQueue, InMemoryInventory, InMemoryLockStore,
    InMemoryMarkerStore, InMemoryRateCounter, InMemoryStockCounter, RecordingDeadLetterSink,
};
use flashgate_testing::test_clock;
use flashgate_web::{AppState, CORRELATION_ID_HEADER, DispatchMode, USER_ID_HEADER, router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// User id on the operator list of every test app.
const OPERATOR: i64 = 100;

struct TestApp {
    app: Router,
    challenges: InMemoryChallengeStore,
    queue: InMemoryDispatchQueue,
    dead_letters: RecordingDeadLetterSink,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

fn relaxed_settings() -> FlashSaleSettings {
    Endpoint::ALL
        .into_iter()
        .fold(FlashSaleSettings::default(), |settings, endpoint| {
            let requires_auth = settings.policy(endpoint).is_none_or(|p| p.requires_auth);
            settings.with_policy(
                endpoint,
                AccessPolicy {
                    window: Duration::from_secs(1),
                    max_count: 100_000,
                    requires_auth,
                },
            )
        })
}

fn test_app(items: Vec<Item>, settings: &FlashSaleSettings, mode: DispatchMode) -> TestApp {
    let inventory = InMemoryInventory::new();
    for item in items {
        inventory.insert_item(item);
    }
    let challenges = InMemoryChallengeStore::new();
    let queue = InMemoryDispatchQueue::new();
    let dead_letters = RecordingDeadLetterSink::new();

    let providers = Providers {
        rate_counter: Arc::new(InMemoryRateCounter::new()),
        challenges: Arc::new(challenges.clone()),
        stock: Arc::new(InMemoryStockCounter::new()),
        locks: Arc::new(InMemoryLockStore::new()),
        markers: Arc::new(InMemoryMarkerStore::new()),
        inventory: Arc::new(inventory),
        queue: Arc::new(queue.clone()),
        dead_letters: Arc::new(dead_letters.clone()),
        clock: Arc::new(test_clock()),
    };
    let sale = Arc::new(FlashSale::new(providers, settings));
    let state = AppState::new(sale, Arc::new(dead_letters.clone()))
        .with_mode(mode)
        .with_operators([UserId(OPERATOR)]);

    TestApp {
        app: router(state),
        challenges,
        queue,
        dead_letters,
    }
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, user: Option<i64>, body: Option<Value>) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn get(&self, uri: &str, user: Option<i64>) -> Reply {
        self.call(Method::GET, uri, user, None).await
    }

    async fn post(&self, uri: &str, user: Option<i64>, body: Value) -> Reply {
        self.call(Method::POST, uri, user, Some(body)).await
    }

    /// Walk challenge → verify → purchase-path over HTTP.
    async fn path_token(&self, user: i64, item: i64) -> String {
        let challenge = self.post("/challenge", Some(user), json!({"item_id": item})).await;
        assert_eq!(challenge.status, StatusCode::OK, "{:?}", challenge.body);
        assert!(challenge.body["question"].as_str().unwrap().ends_with("= ?"));

        let answer = self.challenges.peek_answer(UserId(user), ItemId(item)).unwrap();
        let verify = self
            .post(
                "/challenge/verify",
                Some(user),
                json!({"item_id": item, "answer": answer}),
            )
            .await;
        assert_eq!(verify.status, StatusCode::OK);
        assert_eq!(verify.body, json!({"ok": true}));

        let path = self.post("/purchase-path", Some(user), json!({"item_id": item})).await;
        assert_eq!(path.status, StatusCode::OK);
        path.body["token"].as_str().unwrap().to_string()
    }
}

fn sync_app(items: Vec<Item>) -> TestApp {
    test_app(items, &relaxed_settings(), DispatchMode::Synchronous)
}

#[tokio::test]
async fn health_reports_ok() {
    let app = sync_app(vec![]);

    let reply = app.get("/health", None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "ok");
}

#[tokio::test]
async fn synchronous_purchase_returns_the_order() {
    let app = sync_app(vec![open_item(ItemId(1), 3)]);
    let token = app.path_token(7, 1).await;

    let reply = app
        .post("/purchase", Some(7), json!({"item_id": 1, "token": token}))
        .await;

    assert_eq!(reply.status, StatusCode::CREATED, "{:?}", reply.body);
    let order_id = reply.body["order_id"].as_i64().unwrap();
    assert_eq!(reply.body["item_id"], 1);

    let check = app.get("/purchase/check/1", Some(7)).await;
    assert_eq!(check.body, json!({"item_id": 1, "purchased": true, "order_id": order_id}));

    let orders = app.get("/orders", Some(7)).await;
    assert_eq!(orders.body.as_array().unwrap().len(), 1);

    let order = app.get(&format!("/orders/{order_id}"), Some(7)).await;
    assert_eq!(order.status, StatusCode::OK);
    assert_eq!(order.body["status"], "unpaid");
}

#[tokio::test]
async fn second_purchase_reports_the_existing_order() {
    let app = sync_app(vec![open_item(ItemId(1), 3)]);
    let token = app.path_token(7, 1).await;
    let first = app
        .post("/purchase", Some(7), json!({"item_id": 1, "token": token}))
        .await;

    let token = app.path_token(7, 1).await;
    let second = app
        .post("/purchase", Some(7), json!({"item_id": 1, "token": token}))
        .await;

    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.body["code"], "ALREADY_PURCHASED");
    assert!(first.body["order_id"].is_i64());
    assert_eq!(second.body["order_id"], first.body["order_id"]);
}

#[tokio::test]
async fn sold_out_is_distinguishable_from_already_purchased() {
    let app = sync_app(vec![open_item(ItemId(1), 1)]);
    let token = app.path_token(1, 1).await;
    app.post("/purchase", Some(1), json!({"item_id": 1, "token": token}))
        .await;

    let token = app.path_token(2, 1).await;
    let reply = app
        .post("/purchase", Some(2), json!({"item_id": 1, "token": token}))
        .await;

    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["code"], "NO_STOCK");
    assert_eq!(reply.body["error_code"], 500_500);
}

#[tokio::test]
async fn anonymous_purchase_is_unauthenticated() {
    let app = sync_app(vec![open_item(ItemId(1), 3)]);

    let reply = app
        .post("/purchase", None, json!({"item_id": 1, "token": "x"}))
        .await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn malformed_identity_header_is_a_bad_request() {
    let app = sync_app(vec![open_item(ItemId(1), 3)]);

    let request = Request::builder()
        .uri("/orders")
        .header(USER_ID_HEADER, "not-a-number")
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn purchase_without_path_token_is_forbidden() {
    let app = sync_app(vec![open_item(ItemId(1), 3)]);

    let reply = app
        .post("/purchase", Some(3), json!({"item_id": 1, "token": "forged"}))
        .await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body["code"], "INVALID_PATH");
}

#[tokio::test]
async fn path_requires_a_verified_challenge() {
    let app = sync_app(vec![open_item(ItemId(1), 3)]);
    app.post("/challenge", Some(3), json!({"item_id": 1})).await;

    let reply = app.post("/purchase-path", Some(3), json!({"item_id": 1})).await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body["code"], "INVALID_CHALLENGE");
}

#[tokio::test]
async fn wrong_answer_is_rejected() {
    let app = sync_app(vec![open_item(ItemId(1), 3)]);
    app.post("/challenge", Some(3), json!({"item_id": 1})).await;

    let reply = app
        .post(
            "/challenge/verify",
            Some(3),
            json!({"item_id": 1, "answer": "not a number"}),
        )
        .await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.body["code"], "INVALID_CHALLENGE");
}

#[tokio::test]
async fn upcoming_sale_is_not_active() {
    let mut item = open_item(ItemId(1), 3);
    item.sale_window = upcoming_window();
    let app = sync_app(vec![item]);
    app.post("/challenge", Some(3), json!({"item_id": 1})).await;
    let answer = app.challenges.peek_answer(UserId(3), ItemId(1)).unwrap();
    app.post(
        "/challenge/verify",
        Some(3),
        json!({"item_id": 1, "answer": answer}),
    )
    .await;

    let reply = app.post("/purchase-path", Some(3), json!({"item_id": 1})).await;

    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["code"], "SALE_NOT_ACTIVE");
}

#[tokio::test]
async fn polling_faster_than_allowed_is_rate_limited() {
    let app = test_app(
        vec![open_item(ItemId(1), 3)],
        &FlashSaleSettings::default(),
        DispatchMode::Queued,
    );

    let first = app.get("/purchase-result?item_id=1", Some(5)).await;
    let second = app.get("/purchase-result?item_id=1", Some(5)).await;

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.body["code"], "RATE_LIMITED");
    assert!(second.headers.contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn queued_purchase_is_accepted_and_pending() {
    let app = test_app(
        vec![open_item(ItemId(1), 3)],
        &relaxed_settings(),
        DispatchMode::Queued,
    );
    let token = app.path_token(9, 1).await;

    let reply = app
        .post("/purchase", Some(9), json!({"item_id": 1, "token": token}))
        .await;

    assert_eq!(reply.status, StatusCode::ACCEPTED);
    assert_eq!(reply.body, json!({"status": "pending"}));
    assert_eq!(app.queue.published(), 1);

    let poll = app.get("/purchase-result?item_id=1", Some(9)).await;
    assert_eq!(poll.body, json!({"status": "pending"}));
}

#[tokio::test]
async fn catalog_is_public() {
    let app = sync_app(vec![open_item(ItemId(1), 3), open_item(ItemId(2), 0)]);

    let list = app.get("/items", None).await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body.as_array().unwrap().len(), 2);

    let item = app.get("/items/1", None).await;
    assert_eq!(item.body["remaining_stock"], 3);
    assert_eq!(item.body["sale_status"]["state"], "active");

    let missing = app.get("/items/99", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body["code"], "ITEM_NOT_FOUND");
}

#[tokio::test]
async fn another_users_order_is_not_found() {
    let app = sync_app(vec![open_item(ItemId(1), 3)]);
    let token = app.path_token(7, 1).await;
    let placed = app
        .post("/purchase", Some(7), json!({"item_id": 1, "token": token}))
        .await;
    let order_id = placed.body["order_id"].as_i64().unwrap();

    let reply = app.get(&format!("/orders/{order_id}"), Some(8)).await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["code"], "ORDER_NOT_FOUND");
}

#[tokio::test]
async fn correlation_id_is_echoed() {
    let app = sync_app(vec![]);
    let request = Request::builder()
        .uri("/health")
        .header(CORRELATION_ID_HEADER, "7f1e8c8e-4f3a-4d4c-9d51-2b1f0c1a2b3c")
        .body(Body::empty())
        .unwrap();

    let response = app.app.clone().oneshot(request).await.unwrap();

    assert_eq!(
        response.headers()[CORRELATION_ID_HEADER],
        "7f1e8c8e-4f3a-4d4c-9d51-2b1f0c1a2b3c"
    );
}

#[tokio::test]
async fn operator_closes_a_pending_dead_letter_once() {
    let app = sync_app(vec![]);
    let request = PurchaseRequest::new(UserId(4), ItemId(1), Utc::now());
    app.dead_letters
        .record(&DeadLetter {
            payload: b"{}".to_vec(),
            request: Some(request),
            reason: "item 1 not found".into(),
            delivery_count: 3,
            failed_at: Utc::now(),
        })
        .await
        .unwrap();

    let pending = app.get("/admin/dead-letters", Some(OPERATOR)).await;
    assert_eq!(pending.status, StatusCode::OK);
    let entries = pending.body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["reason"], "item 1 not found");
    let id = entries[0]["id"].as_i64().unwrap();

    let resolved = app
        .post(
            &format!("/admin/dead-letters/{id}/resolve"),
            Some(OPERATOR),
            json!({"notes": "refunded manually"}),
        )
        .await;
    assert_eq!(resolved.status, StatusCode::OK);
    assert_eq!(resolved.body["status"], "resolved");
    assert_eq!(resolved.body["closed_by"], "100");

    let again = app
        .post(&format!("/admin/dead-letters/{id}/discard"), Some(OPERATOR), json!({}))
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let pending = app.get("/admin/dead-letters?status=pending", Some(OPERATOR)).await;
    assert!(pending.body.as_array().unwrap().is_empty());

    let unknown = app.get("/admin/dead-letters/999", Some(OPERATOR)).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let bad_status = app.get("/admin/dead-letters?status=open", Some(OPERATOR)).await;
    assert_eq!(bad_status.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dead_letters_require_an_operator() {
    let app = sync_app(vec![]);

    let reply = app.get("/admin/dead-letters", None).await;

    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn buyers_cannot_touch_dead_letters() {
    let app = sync_app(vec![]);
    app.dead_letters
        .record(&DeadLetter {
            payload: b"{}".to_vec(),
            request: Some(PurchaseRequest::new(UserId(4), ItemId(1), Utc::now())),
            reason: "commit kept failing".into(),
            delivery_count: 3,
            failed_at: Utc::now(),
        })
        .await
        .unwrap();

    let listed = app.get("/admin/dead-letters", Some(7)).await;
    assert_eq!(listed.status, StatusCode::FORBIDDEN);
    assert_eq!(listed.body["code"], "FORBIDDEN");

    let discarded = app
        .post("/admin/dead-letters/1/discard", Some(7), json!({}))
        .await;
    assert_eq!(discarded.status, StatusCode::FORBIDDEN);

    let pending = app.get("/admin/dead-letters", Some(OPERATOR)).await;
    assert_eq!(pending.body.as_array().unwrap().len(), 1);
    assert_eq!(pending.body[0]["status"], "pending");
}
