use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::manager::Manager;
use crate::order_hash::{self, HashError};
use crate::primitives::{
    ActiveOrder, ActiveOrders, AllReadyFills, Meta, Order, OrderEntry, OrderState, OrderStatus,
    PublishedSecrets, Quote, QuoteEntry, QuoteRequest, ReadyFills, ReadyFillsForOrder,
    SecretInput,
};
use crate::quoter::{self, QuoterClient};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<Manager>,
    pub quoter: Arc<QuoterClient>,
    pub dev_mode: bool,
    pub outbox_capacity: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("quote provider unavailable")]
    Upstream,
    #[error("failed to hash order: {0}")]
    BadOrder(#[from] HashError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream => StatusCode::BAD_GATEWAY,
            ApiError::BadOrder(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub async fn get_health() -> &'static str {
    "Online"
}

/// Proxy the upstream quoter and cache the result under a fresh quote id.
///
/// In dev mode the upstream is skipped and the fixed template quote is
/// returned; the id is freshly generated either way.
pub async fn receive_quote(
    State(state): State<AppState>,
    Query(request): Query<QuoteRequest>,
) -> Result<Json<Quote>, ApiError> {
    let mut quote = if state.dev_mode {
        quoter::dev_quote(&request)
    } else {
        state.quoter.get_quote(&request).await.map_err(|e| {
            tracing::error!(error = %e, "upstream quote fetch failed");
            ApiError::Upstream
        })?
    };

    let quote_id = Uuid::new_v4().to_string();
    quote.quote_id = Some(quote_id.clone());
    state
        .manager
        .set_quote(QuoteEntry {
            quote_id: quote_id.clone(),
            request,
            quote: quote.clone(),
        })
        .await;

    tracing::debug!(quote_id, "quote cached");
    Ok(Json(quote))
}

/// Accept a signed cross chain order and announce it to resolvers.
pub async fn submit_order(
    State(state): State<AppState>,
    Json(order): Json<Order>,
) -> Result<StatusCode, ApiError> {
    validate_order(&order)?;

    let quote = state
        .manager
        .get_quote(&order.quote_id)
        .await
        .ok_or(ApiError::NotFound("quote"))?;

    let hash = order_hash::order_hash(order.src_chain_id, &order.limit_order)?;
    let hash_hex = order_hash::to_hex(hash);

    let status = seed_status(&hash_hex, &order, &quote);
    let entry = state
        .manager
        .set_order(OrderEntry::new(hash_hex.clone(), order, status))
        .await
        .map_err(|_| ApiError::NotFound("quote"))?;
    state.manager.handle_order_event(&entry);

    tracing::info!(
        order_hash = hash_hex,
        maker = entry.order.limit_order.maker,
        src_chain = %entry.order.src_chain_id,
        "order accepted"
    );
    Ok(StatusCode::ACCEPTED)
}

/// Accept a maker-revealed secret and relay it to resolvers.
///
/// Rejected until at least one fill of the order has gone through chain
/// verification and its withdrawal locks have opened.
pub async fn submit_secret(
    State(state): State<AppState>,
    Json(input): Json<SecretInput>,
) -> Result<StatusCode, ApiError> {
    let secret = input.secret.trim().to_lowercase();
    if secret.len() <= 2
        || !secret.starts_with("0x")
        || !secret[2..].chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(ApiError::BadRequest(
            "secret must be a 0x-prefixed hex string".to_string(),
        ));
    }

    let entry = state
        .manager
        .get_order(&input.order_hash.to_lowercase())
        .await
        .ok_or(ApiError::NotFound("order"))?;
    if entry.state() < OrderState::Ready {
        return Err(ApiError::BadRequest(
            "order has no fill ready to accept a secret".to_string(),
        ));
    }

    entry.record_secret(&secret);
    state.manager.handle_secret_event(&entry.order_hash, &secret);
    Ok(StatusCode::ACCEPTED)
}

/// Secrets the maker has published for this order so far, for resolvers that
/// reconnect after missing the live frame.
pub async fn get_published_secrets(
    State(state): State<AppState>,
    Path(order_hash): Path<String>,
) -> Result<Json<PublishedSecrets>, ApiError> {
    let entry = state
        .manager
        .get_order(&order_hash.to_lowercase())
        .await
        .ok_or(ApiError::NotFound("order"))?;

    Ok(Json(PublishedSecrets {
        order_hash: entry.order_hash.clone(),
        order_type: entry.order_type,
        secrets: entry.submitted_secrets(),
        secret_hashes: entry.order.secret_hashes.clone().unwrap_or_default(),
    }))
}

/// Current lifecycle snapshot of an order.
pub async fn get_order_status(
    State(state): State<AppState>,
    Path(order_hash): Path<String>,
) -> Result<Json<OrderStatus>, ApiError> {
    let entry = state
        .manager
        .get_order(&order_hash.to_lowercase())
        .await
        .ok_or(ApiError::NotFound("order"))?;

    let mut status = entry.status.clone();
    status.status = entry.state();
    Ok(Json(status))
}

/// Drain-on-poll: hand out the fills that became safe since the last call.
pub async fn get_ready_fills(
    State(state): State<AppState>,
    Path(order_hash): Path<String>,
) -> Result<Json<ReadyFills>, ApiError> {
    let fills = state
        .manager
        .drain_ready_fills(&order_hash.to_lowercase())
        .await
        .ok_or(ApiError::NotFound("order"))?;
    Ok(Json(ReadyFills { fills }))
}

/// Drain-on-poll across every live order; orders with nothing pending are
/// omitted.
pub async fn get_all_ready_fills(State(state): State<AppState>) -> Json<AllReadyFills> {
    let orders = state
        .manager
        .active_orders()
        .into_iter()
        .filter_map(|entry| {
            let fills = entry.drain_fills();
            (!fills.is_empty()).then(|| ReadyFillsForOrder {
                order_hash: entry.order_hash.clone(),
                maker_address: entry.order.limit_order.maker.clone(),
                fills,
            })
        })
        .collect();
    Json(AllReadyFills { orders })
}

/// Live orders created by the given maker address.
pub async fn get_orders_by_maker(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Json<Vec<ActiveOrder>> {
    let items = state
        .manager
        .active_orders()
        .into_iter()
        .filter(|entry| entry.order.limit_order.maker.eq_ignore_ascii_case(&address))
        .map(|entry| to_active_order(&entry))
        .collect();
    Json(items)
}

#[derive(Debug, Deserialize)]
pub struct ActiveOrdersQuery {
    page: Option<u64>,
    limit: Option<u64>,
}

/// Paginated listing of orders still inside their cancellation window.
pub async fn get_active_orders(
    State(state): State<AppState>,
    Query(query): Query<ActiveOrdersQuery>,
) -> Json<ActiveOrders> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(100).clamp(1, 500);

    let all = state.manager.active_orders();
    let total_items = all.len() as u64;
    let total_pages = total_items.div_ceil(limit);

    let items = all
        .into_iter()
        .skip(((page - 1) * limit) as usize)
        .take(limit as usize)
        .map(|entry| to_active_order(&entry))
        .collect();

    Json(ActiveOrders {
        meta: Meta {
            total_items,
            items_per_page: limit,
            total_pages,
            current_page: page,
        },
        items,
    })
}

fn to_active_order(entry: &OrderEntry) -> ActiveOrder {
    ActiveOrder {
        order_hash: entry.order_hash.clone(),
        quote_id: entry.order.quote_id.clone(),
        src_chain_id: entry.status.src_chain_id,
        dst_chain_id: entry.status.dst_chain_id,
        order: entry.order.limit_order.clone(),
        signature: entry.order.signature.clone(),
        extension: entry.order.extension.clone(),
        secret_hashes: entry.order.secret_hashes.clone().unwrap_or_default(),
        order_type: entry.order_type,
        status: entry.state(),
        created_at: entry.status.created_at,
    }
}

fn validate_order(order: &Order) -> Result<(), ApiError> {
    if order.signature.trim().is_empty() {
        return Err(ApiError::BadRequest("signature cannot be empty".to_string()));
    }
    if order.quote_id.trim().is_empty() {
        return Err(ApiError::BadRequest("quoteId cannot be empty".to_string()));
    }
    if order.limit_order.salt.trim().is_empty() {
        return Err(ApiError::BadRequest("salt cannot be empty".to_string()));
    }
    if let Some(hashes) = &order.secret_hashes {
        for hash in hashes {
            if !hash.starts_with("0x") || hash.len() != 66 {
                return Err(ApiError::BadRequest(
                    "secretHashes entries must be 32-byte hex strings".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn seed_status(order_hash: &str, order: &Order, quote: &QuoteEntry) -> OrderStatus {
    let preset = quote.quote.recommended();
    let now_ms = Utc::now().timestamp_millis() as u64;

    OrderStatus {
        order_hash: order_hash.to_string(),
        status: OrderState::Pending,
        order: order.limit_order.clone(),
        extension: order.extension.clone(),
        points: preset.points.clone(),
        initial_rate_bump: preset.initial_rate_bump,
        auction_start_date: now_ms + preset.start_auction_in * 1000,
        auction_duration: preset.auction_duration,
        created_at: now_ms,
        src_token_price_usd: quote.quote.prices.usd.src_token.clone(),
        dst_token_price_usd: quote.quote.prices.usd.dst_token.clone(),
        cancel_tx: None,
        src_chain_id: order.src_chain_id.wire(),
        dst_chain_id: quote.request.dst_chain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use alloy::primitives::B256;
    use tokio::sync::mpsc;

    use crate::chains::aptos::AptosChain;
    use crate::chains::evm::EvmChain;
    use crate::primitives::{APTOS_CHAIN_ID, ChainId, LimitOrder};

    fn test_state() -> AppState {
        // the chain clients are never called from these tests; connecting is lazy
        let evm = Arc::new(EvmChain::connect("http://localhost:8545").unwrap());
        let aptos = Arc::new(AptosChain::new("http://localhost:8080").unwrap());
        let manager = Arc::new(Manager::new(
            evm,
            aptos,
            Duration::from_secs(900),
            Duration::ZERO,
        ));
        let quoter =
            Arc::new(QuoterClient::new("http://localhost:9999".to_string(), String::new()).unwrap());
        AppState {
            manager,
            quoter,
            dev_mode: true,
            outbox_capacity: 8,
        }
    }

    fn quote_request() -> QuoteRequest {
        QuoteRequest {
            src_chain: 1,
            dst_chain: APTOS_CHAIN_ID,
            src_token_address: "0x3333333333333333333333333333333333333333".to_string(),
            dst_token_address: "0x1::test_coin::TestCoin".to_string(),
            amount: "1000".to_string(),
            wallet_address: "0x1111111111111111111111111111111111111111".to_string(),
        }
    }

    fn order_for(quote_id: &str) -> Order {
        Order {
            src_chain_id: ChainId::Evm(1),
            limit_order: LimitOrder {
                salt: "42".to_string(),
                maker: "0x1111111111111111111111111111111111111111".to_string(),
                receiver: "0x2222222222222222222222222222222222222222".to_string(),
                maker_asset: "0x3333333333333333333333333333333333333333".to_string(),
                taker_asset: "0x4444444444444444444444444444444444444444".to_string(),
                making_amount: "1000".to_string(),
                taking_amount: "2000".to_string(),
                maker_traits: "0".to_string(),
            },
            signature: "0x1b2c".to_string(),
            quote_id: quote_id.to_string(),
            extension: "0x".to_string(),
            secret_hashes: None,
        }
    }

    async fn fetch_dev_quote(state: &AppState) -> Quote {
        receive_quote(State(state.clone()), Query(quote_request()))
            .await
            .unwrap()
            .0
    }

    async fn first_active_order_hash(state: &AppState) -> String {
        let active = get_active_orders(
            State(state.clone()),
            Query(ActiveOrdersQuery {
                page: None,
                limit: None,
            }),
        )
        .await;
        active.0.items[0].order_hash.clone()
    }

    async fn submitted_order_hash(state: &AppState) -> String {
        let quote = fetch_dev_quote(state).await;
        let order = order_for(quote.quote_id.as_deref().unwrap());
        submit_order(State(state.clone()), Json(order)).await.unwrap();
        first_active_order_hash(state).await
    }

    #[tokio::test]
    async fn dev_quote_gets_a_fresh_id_each_call() {
        let state = test_state();
        let first = fetch_dev_quote(&state).await;
        let second = fetch_dev_quote(&state).await;
        assert_ne!(first.quote_id, second.quote_id);
        assert!(
            state
                .manager
                .get_quote(first.quote_id.as_deref().unwrap())
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn submit_broadcasts_and_status_is_pending() {
        let state = test_state();
        let (tx, mut rx) = mpsc::channel(8);
        state.manager.broadcaster().register(tx);

        let quote = fetch_dev_quote(&state).await;
        let order = order_for(quote.quote_id.as_deref().unwrap());
        let result = submit_order(State(state.clone()), Json(order.clone())).await;
        assert_eq!(result.unwrap(), StatusCode::ACCEPTED);

        // exactly one BROADC frame whose body parses back to the order
        let frame = rx.recv().await.unwrap();
        let parsed: Order = serde_json::from_str(frame.strip_prefix("BROADC ").unwrap()).unwrap();
        assert_eq!(parsed, order);
        assert!(rx.try_recv().is_err());

        let hash = first_active_order_hash(&state).await;
        let status = get_order_status(State(state.clone()), Path(hash))
            .await
            .unwrap();
        assert_eq!(status.0.status, OrderState::Pending);
        assert!(status.0.created_at <= Utc::now().timestamp_millis() as u64);
        assert_eq!(status.0.initial_rate_bump, 1000);
        assert!(!status.0.points.is_empty());
    }

    #[tokio::test]
    async fn submit_with_unknown_quote_is_404() {
        let state = test_state();
        let err = submit_order(State(state.clone()), Json(order_for("nope")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("quote")));
    }

    #[tokio::test]
    async fn submit_with_bad_numeric_salt_is_bad_order() {
        let state = test_state();
        let quote = fetch_dev_quote(&state).await;
        let mut order = order_for(quote.quote_id.as_deref().unwrap());
        order.limit_order.salt = "not-a-number".to_string();

        let err = submit_order(State(state.clone()), Json(order)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadOrder(_)));
    }

    #[tokio::test]
    async fn secret_is_rejected_until_a_fill_is_ready() {
        let state = test_state();
        let hash = submitted_order_hash(&state).await;

        let err = submit_secret(
            State(state.clone()),
            Json(SecretInput {
                order_hash: hash.clone(),
                secret: "0xdead".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        // once a fill is recorded, the secret goes through verbatim
        state
            .manager
            .allow_secret_release(&hash, B256::repeat_byte(0xbb), "0xaa", "0xbb")
            .await;

        let (tx, mut rx) = mpsc::channel(8);
        state.manager.broadcaster().register(tx);

        let result = submit_secret(
            State(state.clone()),
            Json(SecretInput {
                order_hash: hash.clone(),
                secret: "0xdead".to_string(),
            }),
        )
        .await;
        assert_eq!(result.unwrap(), StatusCode::ACCEPTED);
        assert_eq!(rx.recv().await.unwrap(), format!("SECRET {hash} 0xdead"));
    }

    #[tokio::test]
    async fn ready_fills_drain_on_poll() {
        let state = test_state();
        let hash = submitted_order_hash(&state).await;
        state
            .manager
            .allow_secret_release(&hash, B256::repeat_byte(0xbb), "0xaa", "0xbb")
            .await;

        let fills = get_ready_fills(State(state.clone()), Path(hash.clone()))
            .await
            .unwrap();
        assert_eq!(fills.0.fills.len(), 1);
        assert_eq!(fills.0.fills[0].idx, 0);
        assert_eq!(fills.0.fills[0].src_tx_hash, "0xaa");

        let again = get_ready_fills(State(state.clone()), Path(hash)).await.unwrap();
        assert!(again.0.fills.is_empty());
    }

    #[tokio::test]
    async fn missing_order_is_404_everywhere() {
        let state = test_state();
        let missing = "0x".to_string() + &"00".repeat(32);

        assert!(matches!(
            get_order_status(State(state.clone()), Path(missing.clone())).await,
            Err(ApiError::NotFound("order"))
        ));
        assert!(matches!(
            get_ready_fills(State(state.clone()), Path(missing.clone())).await,
            Err(ApiError::NotFound("order"))
        ));
        assert!(matches!(
            submit_secret(
                State(state.clone()),
                Json(SecretInput {
                    order_hash: missing,
                    secret: "0xdead".to_string(),
                }),
            )
            .await,
            Err(ApiError::NotFound("order"))
        ));
    }

    #[tokio::test]
    async fn malformed_secret_is_rejected_before_lookup() {
        let state = test_state();
        let err = submit_secret(
            State(state.clone()),
            Json(SecretInput {
                order_hash: "0xabc".to_string(),
                secret: "dead".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn published_secrets_accumulate_with_indexes() {
        let state = test_state();
        let quote = fetch_dev_quote(&state).await;
        let mut order = order_for(quote.quote_id.as_deref().unwrap());
        let hashlock = format!(
            "0x{}",
            hex::encode(alloy::primitives::keccak256([0xde, 0xad]))
        );
        order.secret_hashes = Some(vec!["0x".to_string() + &"aa".repeat(32), hashlock]);
        submit_order(State(state.clone()), Json(order)).await.unwrap();
        let hash = first_active_order_hash(&state).await;

        state
            .manager
            .allow_secret_release(&hash, B256::repeat_byte(0xaa), "0xaa", "0xbb")
            .await;
        submit_secret(
            State(state.clone()),
            Json(SecretInput {
                order_hash: hash.clone(),
                secret: "0xdead".to_string(),
            }),
        )
        .await
        .unwrap();

        let published = get_published_secrets(State(state.clone()), Path(hash.clone()))
            .await
            .unwrap();
        assert_eq!(published.0.order_hash, hash);
        assert_eq!(published.0.secret_hashes.len(), 2);
        assert_eq!(published.0.secrets.len(), 1);
        assert_eq!(published.0.secrets[0].idx, Some(1));
        assert_eq!(published.0.secrets[0].secret, "0xdead");
    }

    #[tokio::test]
    async fn all_orders_ready_fills_drain_and_skip_empty() {
        let state = test_state();
        let hash = submitted_order_hash(&state).await;

        let empty = get_all_ready_fills(State(state.clone())).await;
        assert!(empty.0.orders.is_empty());

        state
            .manager
            .allow_secret_release(&hash, B256::repeat_byte(0xbb), "0xaa", "0xbb")
            .await;

        let listing = get_all_ready_fills(State(state.clone())).await;
        assert_eq!(listing.0.orders.len(), 1);
        assert_eq!(listing.0.orders[0].order_hash, hash);
        assert_eq!(listing.0.orders[0].fills.len(), 1);

        // drained: the next sweep has nothing left
        let again = get_all_ready_fills(State(state.clone())).await;
        assert!(again.0.orders.is_empty());
    }

    #[tokio::test]
    async fn orders_by_maker_filters_on_address() {
        let state = test_state();
        let hash = submitted_order_hash(&state).await;

        let mine = get_orders_by_maker(
            State(state.clone()),
            Path("0x1111111111111111111111111111111111111111".to_string()),
        )
        .await;
        assert_eq!(mine.0.len(), 1);
        assert_eq!(mine.0[0].order_hash, hash);

        let theirs = get_orders_by_maker(
            State(state.clone()),
            Path("0x9999999999999999999999999999999999999999".to_string()),
        )
        .await;
        assert!(theirs.0.is_empty());
    }

    #[tokio::test]
    async fn active_orders_paginate() {
        let state = test_state();
        let hash = submitted_order_hash(&state).await;

        let listing = get_active_orders(
            State(state.clone()),
            Query(ActiveOrdersQuery {
                page: Some(1),
                limit: Some(10),
            }),
        )
        .await;
        assert_eq!(listing.0.meta.total_items, 1);
        assert_eq!(listing.0.items.len(), 1);
        assert_eq!(listing.0.items[0].order_hash, hash);
        assert_eq!(listing.0.items[0].status, OrderState::Pending);

        let beyond = get_active_orders(
            State(state.clone()),
            Query(ActiveOrdersQuery {
                page: Some(2),
                limit: Some(10),
            }),
        )
        .await;
        assert!(beyond.0.items.is_empty());
    }
}
