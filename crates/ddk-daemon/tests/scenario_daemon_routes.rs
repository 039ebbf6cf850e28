//! In-process scenario tests for the HTTP surface: idempotency-guarded
//! offer flow, header validation, and saga ingest. The router is driven via
//! `tower::ServiceExt::oneshot` — no TCP socket.
//!
//! Requires DDK_DATABASE_URL (the handlers are backed by real Postgres).

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use ddk_daemon::{routes, state};
use ddk_notify::LogNotifier;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn make_state() -> Arc<state::AppState> {
    let url = std::env::var("DDK_DATABASE_URL")
        .expect("DB tests require DDK_DATABASE_URL; run with -- --include-ignored");
    let pool = sqlx::PgPool::connect(&url).await.expect("connect");
    ddk_db::migrate(&pool).await.expect("migrate");

    let mut config = ddk_config::DealDeskConfig::default();
    config.saga.ops_log_path = None; // no file writes from tests

    Arc::new(
        state::AppState::new(pool, config, "test-hash".to_string(), Arc::new(LogNotifier))
            .expect("state"),
    )
}

fn post(
    uri: &str,
    actor: Option<Uuid>,
    key: Option<&str>,
    body: Value,
) -> Request<axum::body::Body> {
    let mut b = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(a) = actor {
        b = b.header("X-Actor-Id", a.to_string());
    }
    if let Some(k) = key {
        b = b.header("Idempotency-Key", k);
    }
    b.body(axum::body::Body::from(body.to_string())).unwrap()
}

async fn call(
    st: &Arc<state::AppState>,
    req: Request<axum::body::Body>,
) -> (StatusCode, Value) {
    let resp = routes::build_router(Arc::clone(st))
        .oneshot(req)
        .await
        .expect("oneshot failed");
    let status = resp.status();
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is not valid JSON")
    };
    (status, json)
}

fn offer_body(asset_id: Uuid, seller: Uuid) -> Value {
    json!({
        "asset_id": asset_id,
        "seller_id": seller,
        "amount": 100_000,
        "earnest_money": 10_000,
        "offer_type": "CASH"
    })
}

// ---------------------------------------------------------------------------
// Header validation
// ---------------------------------------------------------------------------

#[tokio::test]
#[ignore = "requires DDK_DATABASE_URL"]
async fn missing_idempotency_key_is_400() {
    let st = make_state().await;
    let (status, body) = call(
        &st,
        post("/v1/offers", Some(Uuid::new_v4()), None, offer_body(Uuid::new_v4(), Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "VALIDATION");
    assert!(body["message"].as_str().unwrap().contains("Idempotency-Key"));
}

#[tokio::test]
#[ignore = "requires DDK_DATABASE_URL"]
async fn malformed_idempotency_key_is_400() {
    let st = make_state().await;
    let (status, body) = call(
        &st,
        post(
            "/v1/offers",
            Some(Uuid::new_v4()),
            Some("not a valid key!"),
            offer_body(Uuid::new_v4(), Uuid::new_v4()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "VALIDATION");
}

#[tokio::test]
#[ignore = "requires DDK_DATABASE_URL"]
async fn missing_actor_is_400() {
    let st = make_state().await;
    let (status, body) = call(
        &st,
        post(
            "/v1/offers",
            None,
            Some(&Uuid::new_v4().to_string()),
            offer_body(Uuid::new_v4(), Uuid::new_v4()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("X-Actor-Id"));
}

// ---------------------------------------------------------------------------
// Idempotent offer creation
// ---------------------------------------------------------------------------

#[tokio::test]
#[ignore = "requires DDK_DATABASE_URL"]
async fn same_key_same_body_replays_without_second_offer() {
    let st = make_state().await;
    let buyer = Uuid::new_v4();
    let asset_id = Uuid::new_v4();
    let seller = Uuid::new_v4();
    let key = Uuid::new_v4().to_string();
    let body = offer_body(asset_id, seller);

    let (s1, b1) = call(&st, post("/v1/offers", Some(buyer), Some(&key), body.clone())).await;
    assert_eq!(s1, StatusCode::CREATED, "{b1}");

    let (s2, b2) = call(&st, post("/v1/offers", Some(buyer), Some(&key), body.clone())).await;
    assert_eq!(s2, StatusCode::CREATED);
    assert_eq!(b1, b2, "replay must be byte-identical");

    // Exactly one offer exists for the pair.
    let offers = ddk_db::list_offers_for_asset(&st.pool, asset_id).await.unwrap();
    assert_eq!(offers.len(), 1);
}

#[tokio::test]
#[ignore = "requires DDK_DATABASE_URL"]
async fn same_key_different_body_is_conflict_with_no_side_effect() {
    let st = make_state().await;
    let buyer = Uuid::new_v4();
    let asset_id = Uuid::new_v4();
    let seller = Uuid::new_v4();
    let key = Uuid::new_v4().to_string();

    let (s1, _) = call(
        &st,
        post("/v1/offers", Some(buyer), Some(&key), offer_body(asset_id, seller)),
    )
    .await;
    assert_eq!(s1, StatusCode::CREATED);

    let mut other = offer_body(asset_id, seller);
    other["amount"] = json!(999_999);
    let (s2, b2) = call(&st, post("/v1/offers", Some(buyer), Some(&key), other)).await;
    assert_eq!(s2, StatusCode::CONFLICT);
    assert_eq!(b2["kind"], "CONFLICT");

    let offers = ddk_db::list_offers_for_asset(&st.pool, asset_id).await.unwrap();
    assert_eq!(offers.len(), 1, "conflicting request must have no side effect");
    assert_eq!(offers[0].amount, 100_000);
}

// ---------------------------------------------------------------------------
// Offer lifecycle over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
#[ignore = "requires DDK_DATABASE_URL"]
async fn accept_over_http_declines_siblings_and_rejects_non_seller() {
    let st = make_state().await;
    let asset_id = Uuid::new_v4();
    let seller = Uuid::new_v4();
    let buyer1 = Uuid::new_v4();
    let buyer2 = Uuid::new_v4();

    let (_, o1) = call(
        &st,
        post("/v1/offers", Some(buyer1), Some(&Uuid::new_v4().to_string()), offer_body(asset_id, seller)),
    )
    .await;
    let (_, o2) = call(
        &st,
        post("/v1/offers", Some(buyer2), Some(&Uuid::new_v4().to_string()), offer_body(asset_id, seller)),
    )
    .await;
    let o1_id = o1["id"].as_str().unwrap();
    let o2_id = o2["id"].as_str().unwrap();

    // A buyer cannot accept.
    let (s, b) = call(
        &st,
        post(
            &format!("/v1/offers/{o1_id}/accept"),
            Some(buyer1),
            Some(&Uuid::new_v4().to_string()),
            json!({}),
        ),
    )
    .await;
    assert_eq!(s, StatusCode::FORBIDDEN, "{b}");
    assert_eq!(b["kind"], "AUTHORIZATION");

    // The seller accepts offer 1; offer 2 is declined in the same stroke.
    let (s, b) = call(
        &st,
        post(
            &format!("/v1/offers/{o1_id}/accept"),
            Some(seller),
            Some(&Uuid::new_v4().to_string()),
            json!({}),
        ),
    )
    .await;
    assert_eq!(s, StatusCode::OK, "{b}");
    assert_eq!(b["offer"]["status"], "ACCEPTED");
    assert_eq!(b["declinedSiblingIds"][0], *o2_id);

    // Accepting the declined sibling is a conflict naming both states.
    let (s, b) = call(
        &st,
        post(
            &format!("/v1/offers/{o2_id}/accept"),
            Some(seller),
            Some(&Uuid::new_v4().to_string()),
            json!({}),
        ),
    )
    .await;
    assert_eq!(s, StatusCode::CONFLICT);
    let msg = b["message"].as_str().unwrap();
    assert!(msg.contains("DECLINED") && msg.contains("ACCEPTED"), "{msg}");
}

// ---------------------------------------------------------------------------
// Saga ingest over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
#[ignore = "requires DDK_DATABASE_URL"]
async fn chain_event_ingest_applies_then_skips_duplicate() {
    let st = make_state().await;
    let asset_id = Uuid::new_v4();
    ddk_db::seed_catalog_asset(&st.pool, asset_id, Uuid::new_v4(), ddk_schemas::FeeCategory::Standard)
        .await
        .expect("seed");

    let event = json!({
        "id": format!("evt-{}", Uuid::new_v4()),
        "jobId": "job-http-1",
        "eventKind": "ASSET_TOKENIZED",
        "finalStatus": "COMPLETED",
        "originalPayload": { "assetId": asset_id.to_string() },
        "eventOutput": { "contractAddress": "0xhttp", "tokenId": "1" }
    });

    let req = Request::builder()
        .method("POST")
        .uri("/v1/events/chain")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(event.to_string()))
        .unwrap();
    let (s, b) = call(&st, req).await;
    assert_eq!(s, StatusCode::OK, "{b}");
    assert_eq!(b["outcome"], "APPLIED");

    let req = Request::builder()
        .method("POST")
        .uri("/v1/events/chain")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(event.to_string()))
        .unwrap();
    let (s, b) = call(&st, req).await;
    assert_eq!(s, StatusCode::OK);
    assert_eq!(b["outcome"], "SKIPPED_DUPLICATE");
}
