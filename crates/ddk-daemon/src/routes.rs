//! Axum router and all HTTP handlers for ddk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.
//!
//! Every mutating offer/transaction endpoint goes through
//! [`guard::run_guarded`]; the two event-ingest endpoints do not (the saga
//! carries its own durable dedup and must return 500 on transient failures
//! so the sender redelivers).

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use ddk_notify::spawn_notifications;
use ddk_offers::{OfferAction, OfferDraft};
use ddk_schemas::{
    ChainEventMessage, DomainError, DomainResult, Offer, StorageJobNotice, Transaction,
};
use ddk_transactions::TxAction;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::api_types::{
    CancelTransactionRequest, CreateOfferRequest, CreateTransactionRequest, DeclineOfferRequest,
    DepositEarnestRequest, HealthResponse, IngestResponse, StatusResponse, UpdateStatusRequest,
};
use crate::guard::{
    error_response, parse_body, parse_required_body, require_actor, run_guarded,
};
use crate::state::{uptime_secs, AppState, BusMsg};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/offers", post(offer_create).get(offer_list))
        .route("/v1/offers/:id", get(offer_get))
        .route("/v1/offers/:id/review", post(offer_review))
        .route("/v1/offers/:id/accept", post(offer_accept))
        .route("/v1/offers/:id/decline", post(offer_decline))
        .route("/v1/offers/:id/withdraw", post(offer_withdraw))
        .route("/v1/offers/:id/counter", post(offer_counter))
        .route("/v1/transactions", post(transaction_create))
        .route("/v1/transactions/:id", get(transaction_get))
        .route("/v1/transactions/:id/earnest", post(transaction_earnest))
        .route(
            "/v1/transactions/:id/due-diligence",
            post(transaction_due_diligence),
        )
        .route("/v1/transactions/:id/fund", post(transaction_fund))
        .route("/v1/transactions/:id/close", post(transaction_close))
        .route("/v1/transactions/:id/cancel", post(transaction_cancel))
        .route("/v1/transactions/:id/status", post(transaction_status))
        .route("/v1/events/chain", post(ingest_chain))
        .route("/v1/events/storage", post(ingest_storage))
        .with_state(state)
}

fn to_json<T: serde::Serialize>(v: &T) -> DomainResult<Value> {
    serde_json::to_value(v).map_err(|e| DomainError::transient(format!("encode response: {e}")))
}

fn publish_offer(st: &AppState, offer: &Offer) {
    st.publish(BusMsg::Lifecycle {
        entity: "offer".to_string(),
        id: offer.id.to_string(),
        status: offer.status.to_string(),
    });
}

fn publish_transaction(st: &AppState, tx: &Transaction) {
    st.publish(BusMsg::Lifecycle {
        entity: "transaction".to_string(),
        id: tx.id.to_string(),
        status: tx.status.to_string(),
    });
}

fn notify_parties(st: &AppState, buyer: Uuid, seller: Uuid, event: &str, detail: Value) {
    spawn_notifications(
        st.notifier.clone(),
        vec![buyer, seller],
        event.to_string(),
        detail,
    );
}

// ---------------------------------------------------------------------------
// GET /v1/health · /v1/status · /v1/stream
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> Response {
    let db = ddk_db::status(&st.pool).await;
    let (db_ok, has_schema) = match db {
        Ok(s) => (s.ok, s.has_schema),
        Err(_) => (false, false),
    };
    (
        StatusCode::OK,
        Json(StatusResponse {
            ok: db_ok && has_schema,
            db_ok,
            has_schema,
            daemon_uptime_secs: uptime_secs(),
            config_hash: st.config_hash.clone(),
            version: st.build.version.to_string(),
        }),
    )
        .into_response()
}

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);
    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Lifecycle { .. } => "lifecycle",
                    BusMsg::SagaEvent { .. } => "saga",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}

// ---------------------------------------------------------------------------
// Offers
// ---------------------------------------------------------------------------

pub(crate) async fn offer_create(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let buyer = match require_actor(&headers) {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };

    run_guarded(&st, &headers, "POST", "/v1/offers", Some(buyer), &body, || async {
        let req: CreateOfferRequest = parse_required_body(&body)?;
        let draft = OfferDraft {
            asset_id: req.asset_id,
            buyer_id: buyer,
            seller_id: req.seller_id,
            amount: req.amount,
            earnest_money: req.earnest_money,
            dd_period_days: req.dd_period_days,
            closing_date: req.closing_date,
            offer_type: req.offer_type,
            contingencies: req.contingencies,
            terms: req.terms.unwrap_or_else(|| json!({})),
            notes: req.notes,
            parent_offer_id: None,
            counter_depth: 0,
            expires_at: req.expires_at,
        };

        let offer = ddk_db::create_offer(&st.pool, &draft).await?;
        publish_offer(&st, &offer);
        notify_parties(
            &st,
            offer.buyer_id,
            offer.seller_id,
            "OFFER_CREATED",
            json!({ "offerId": offer.id, "assetId": offer.asset_id, "amount": offer.amount }),
        );
        Ok((StatusCode::CREATED, to_json(&offer)?))
    })
    .await
}

#[derive(Debug, Deserialize)]
pub(crate) struct OfferListQuery {
    asset_id: Option<Uuid>,
}

pub(crate) async fn offer_list(
    State(st): State<Arc<AppState>>,
    Query(q): Query<OfferListQuery>,
) -> Response {
    let Some(asset_id) = q.asset_id else {
        return error_response(&DomainError::validation("asset_id query param is required"));
    };

    // Opportunistic sweep so listings never show stale active offers.
    if let Err(e) = ddk_db::sweep_expired_offers(&st.pool).await {
        return error_response(&e);
    }

    match ddk_db::list_offers_for_asset(&st.pool, asset_id).await {
        Ok(offers) => match to_json(&offers) {
            Ok(v) => (StatusCode::OK, Json(v)).into_response(),
            Err(e) => error_response(&e),
        },
        Err(e) => error_response(&e),
    }
}

pub(crate) async fn offer_get(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match ddk_db::fetch_offer(&st.pool, id).await {
        Ok(offer) => match to_json(&offer) {
            Ok(v) => (StatusCode::OK, Json(v)).into_response(),
            Err(e) => error_response(&e),
        },
        Err(e) => error_response(&e),
    }
}

/// Shared shape of the single-offer transition endpoints.
async fn offer_transition(
    st: Arc<AppState>,
    headers: HeaderMap,
    body: Bytes,
    id: Uuid,
    segment: &str,
    action: OfferAction,
    event: &str,
    reason: Option<String>,
) -> Response {
    let actor = match require_actor(&headers) {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };
    let path = format!("/v1/offers/{id}/{segment}");

    run_guarded(&st, &headers, "POST", &path, Some(actor), &body, || async {
        let offer =
            ddk_db::transition_offer(&st.pool, id, action, Some(actor), reason.as_deref()).await?;
        publish_offer(&st, &offer);
        notify_parties(
            &st,
            offer.buyer_id,
            offer.seller_id,
            event,
            json!({ "offerId": offer.id, "status": offer.status }),
        );
        Ok((StatusCode::OK, to_json(&offer)?))
    })
    .await
}

pub(crate) async fn offer_review(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    offer_transition(
        st,
        headers,
        body,
        id,
        "review",
        OfferAction::Review,
        "OFFER_UNDER_REVIEW",
        None,
    )
    .await
}

pub(crate) async fn offer_accept(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let actor = match require_actor(&headers) {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };
    let path = format!("/v1/offers/{id}/accept");

    run_guarded(&st, &headers, "POST", &path, Some(actor), &body, || async {
        let outcome = ddk_db::accept_offer(&st.pool, id, actor).await?;
        publish_offer(&st, &outcome.offer);
        notify_parties(
            &st,
            outcome.offer.buyer_id,
            outcome.offer.seller_id,
            "OFFER_ACCEPTED",
            json!({ "offerId": id, "declined": outcome.declined_sibling_ids.len() }),
        );
        Ok((
            StatusCode::OK,
            json!({
                "offer": to_json(&outcome.offer)?,
                "declinedSiblingIds": outcome.declined_sibling_ids,
            }),
        ))
    })
    .await
}

pub(crate) async fn offer_decline(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req: DeclineOfferRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };
    offer_transition(
        st,
        headers,
        body,
        id,
        "decline",
        OfferAction::Decline,
        "OFFER_DECLINED",
        req.reason,
    )
    .await
}

pub(crate) async fn offer_withdraw(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    offer_transition(
        st,
        headers,
        body,
        id,
        "withdraw",
        OfferAction::Withdraw,
        "OFFER_WITHDRAWN",
        None,
    )
    .await
}

pub(crate) async fn offer_counter(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let actor = match require_actor(&headers) {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };
    let path = format!("/v1/offers/{id}/counter");

    run_guarded(&st, &headers, "POST", &path, Some(actor), &body, || async {
        let terms: ddk_offers::CounterTerms = parse_required_body(&body)?;
        let (parent, child) = ddk_db::counter_offer(&st.pool, id, actor, &terms).await?;
        publish_offer(&st, &parent);
        publish_offer(&st, &child);
        notify_parties(
            &st,
            child.buyer_id,
            child.seller_id,
            "OFFER_COUNTERED",
            json!({ "parentOfferId": parent.id, "counterOfferId": child.id, "amount": child.amount }),
        );
        Ok((
            StatusCode::CREATED,
            json!({ "parent": to_json(&parent)?, "counter": to_json(&child)? }),
        ))
    })
    .await
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

pub(crate) async fn transaction_create(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let actor = match require_actor(&headers) {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };

    run_guarded(&st, &headers, "POST", "/v1/transactions", Some(actor), &body, || async {
        let req: CreateTransactionRequest = parse_required_body(&body)?;
        let tx = ddk_db::create_transaction(&st.pool, req.offer_id, actor).await?;
        publish_transaction(&st, &tx);
        notify_parties(
            &st,
            tx.buyer_id,
            tx.seller_id,
            "TRANSACTION_CREATED",
            json!({ "transactionId": tx.id, "offerId": tx.offer_id }),
        );
        Ok((StatusCode::CREATED, to_json(&tx)?))
    })
    .await
}

pub(crate) async fn transaction_get(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match ddk_db::fetch_transaction(&st.pool, id).await {
        Ok(tx) => match to_json(&tx) {
            Ok(v) => (StatusCode::OK, Json(v)).into_response(),
            Err(e) => error_response(&e),
        },
        Err(e) => error_response(&e),
    }
}

/// Shared shape of the transaction transition endpoints.
async fn transaction_transition(
    st: Arc<AppState>,
    headers: HeaderMap,
    body: Bytes,
    id: Uuid,
    segment: &str,
    action: TxAction,
    event: &'static str,
    earnest_amount: Option<i64>,
    extra_detail: Value,
) -> Response {
    let actor = match require_actor(&headers) {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };
    let path = format!("/v1/transactions/{id}/{segment}");

    run_guarded(&st, &headers, "POST", &path, Some(actor), &body, || async {
        let tx =
            ddk_db::transition_transaction(&st.pool, id, action, actor, earnest_amount).await?;
        publish_transaction(&st, &tx);
        let mut detail = json!({ "transactionId": tx.id, "status": tx.status });
        if let (Value::Object(d), Value::Object(extra)) = (&mut detail, &extra_detail) {
            for (k, v) in extra {
                d.insert(k.clone(), v.clone());
            }
        }
        notify_parties(&st, tx.buyer_id, tx.seller_id, event, detail);
        Ok((StatusCode::OK, to_json(&tx)?))
    })
    .await
}

pub(crate) async fn transaction_earnest(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req: DepositEarnestRequest = match parse_required_body(&body) {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };
    transaction_transition(
        st,
        headers,
        body,
        id,
        "earnest",
        TxAction::DepositEarnest,
        "EARNEST_DEPOSITED",
        Some(req.amount),
        json!({ "amount": req.amount }),
    )
    .await
}

pub(crate) async fn transaction_due_diligence(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    transaction_transition(
        st,
        headers,
        body,
        id,
        "due-diligence",
        TxAction::CompleteDueDiligence,
        "DUE_DILIGENCE_COMPLETED",
        None,
        json!({}),
    )
    .await
}

pub(crate) async fn transaction_fund(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    transaction_transition(
        st,
        headers,
        body,
        id,
        "fund",
        TxAction::Fund,
        "TRANSACTION_FUNDED",
        None,
        json!({}),
    )
    .await
}

pub(crate) async fn transaction_close(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let actor = match require_actor(&headers) {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };
    let path = format!("/v1/transactions/{id}/close");

    run_guarded(&st, &headers, "POST", &path, Some(actor), &body, || async {
        let tx = ddk_db::close_transaction(&st.pool, id, actor).await?;
        publish_transaction(&st, &tx);
        notify_parties(
            &st,
            tx.buyer_id,
            tx.seller_id,
            "TRANSACTION_CLOSED",
            json!({ "transactionId": tx.id, "netProceeds": tx.net_proceeds }),
        );
        Ok((StatusCode::OK, to_json(&tx)?))
    })
    .await
}

pub(crate) async fn transaction_cancel(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req: CancelTransactionRequest = match parse_body(&body) {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };
    transaction_transition(
        st,
        headers,
        body,
        id,
        "cancel",
        TxAction::Cancel,
        "TRANSACTION_CANCELLED",
        None,
        json!({ "reason": req.reason }),
    )
    .await
}

pub(crate) async fn transaction_status(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let actor = match require_actor(&headers) {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };
    let path = format!("/v1/transactions/{id}/status");

    run_guarded(&st, &headers, "POST", &path, Some(actor), &body, || async {
        let req: UpdateStatusRequest = parse_required_body(&body)?;
        let tx = ddk_db::update_transaction_status(
            &st.pool,
            id,
            req.status,
            actor,
            req.earnest_amount,
        )
        .await?;
        publish_transaction(&st, &tx);
        notify_parties(
            &st,
            tx.buyer_id,
            tx.seller_id,
            "TRANSACTION_STATUS_UPDATED",
            json!({ "transactionId": tx.id, "status": tx.status }),
        );
        Ok((StatusCode::OK, to_json(&tx)?))
    })
    .await
}

// ---------------------------------------------------------------------------
// Event ingest (channels A and B)
// ---------------------------------------------------------------------------

pub(crate) async fn ingest_chain(State(st): State<Arc<AppState>>, body: Bytes) -> Response {
    let msg: ChainEventMessage = match parse_required_body(&body) {
        Ok(m) => m,
        Err(e) => return error_response(&e),
    };

    match st.saga.ingest_chain(&msg).await {
        Ok(outcome) => {
            st.publish(BusMsg::SagaEvent {
                event_id: msg.id.clone(),
                outcome: outcome.as_str().to_string(),
            });
            (
                StatusCode::OK,
                Json(IngestResponse {
                    event_id: msg.id,
                    outcome: outcome.as_str().to_string(),
                }),
            )
                .into_response()
        }
        // Transient: 500 so the job runner redelivers with its backoff.
        Err(e) => error_response(&DomainError::transient(e.to_string())),
    }
}

pub(crate) async fn ingest_storage(State(st): State<Arc<AppState>>, body: Bytes) -> Response {
    let notice: StorageJobNotice = match parse_required_body(&body) {
        Ok(m) => m,
        Err(e) => return error_response(&e),
    };

    match st.saga.ingest_storage(&notice).await {
        Ok(outcome) => {
            st.publish(BusMsg::SagaEvent {
                event_id: notice.job_id.clone(),
                outcome: outcome.as_str().to_string(),
            });
            (
                StatusCode::OK,
                Json(IngestResponse {
                    event_id: notice.job_id,
                    outcome: outcome.as_str().to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => error_response(&DomainError::transient(e.to_string())),
    }
}
