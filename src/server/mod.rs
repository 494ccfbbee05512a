pub mod handlers;
pub mod ws;

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tokio::sync::watch;
use tower_http::cors::{AllowHeaders, Any, CorsLayer};
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::server::handlers::{
    AppState, get_active_orders, get_all_ready_fills, get_health, get_order_status,
    get_orders_by_maker, get_published_secrets, get_ready_fills, receive_quote, submit_order,
    submit_secret,
};

/// A client that stalls while sending its request body is cut off here,
/// well before the overall response budget.
const READ_BUDGET: Duration = Duration::from_secs(10);
const WRITE_BUDGET: Duration = Duration::from_secs(30);

/// REST surface: quote proxy, order submission, secret submission, status and
/// ready-fills polling.
pub fn rest_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(AllowHeaders::any());

    let quoter_routes = Router::new().route("/quote/receive", get(receive_quote));

    let relayer_routes = Router::new()
        .route("/submit", post(submit_order))
        .route("/submit/secret", post(submit_secret));

    let orders_routes = Router::new()
        .route("/order/active", get(get_active_orders))
        .route("/order/maker/{address}", get(get_orders_by_maker))
        .route("/order/status/{order_hash}", get(get_order_status))
        .route("/order/secrets/{order_hash}", get(get_published_secrets))
        .route(
            "/order/ready-to-accept-secret-fills",
            get(get_all_ready_fills),
        )
        .route(
            "/order/ready-to-accept-secret-fills/{order_hash}",
            get(get_ready_fills),
        );

    Router::new()
        .route("/health", get(get_health))
        .nest("/quoter/v1.0", quoter_routes)
        .nest("/relayer/v1.0", relayer_routes)
        .nest("/orders/v1.0", orders_routes)
        .layer(TimeoutLayer::new(WRITE_BUDGET))
        .layer(RequestBodyTimeoutLayer::new(READ_BUDGET))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve `app` on `port` until the shutdown signal fires, then stop accepting
/// and drain in-flight connections.
pub async fn serve(
    app: Router,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}
