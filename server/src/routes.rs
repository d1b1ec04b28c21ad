use axum::Router;
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::api;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes and middleware.
///
/// The router must be served with `into_make_service_with_connect_info::<SocketAddr>()`
/// because the rate limiter keys on the peer IP.
pub fn build_router(state: AppState) -> Router {
    // WebSocket endpoint and internal event submission, rate limited per IP
    let mut limited_routes = Router::new()
        .route("/ws", axum::routing::get(ws_handler::ws_upgrade))
        .route("/api/events", axum::routing::post(api::submit_event));

    let governor_config = GovernorConfigBuilder::default()
        .key_extractor(PeerIpKeyExtractor)
        .per_millisecond(state.rate_limit_replenish.as_millis().max(1) as u64)
        .burst_size(state.rate_limit_burst.max(1))
        .finish();

    match governor_config {
        Some(config) => {
            let config = Arc::new(config);

            // Spawn background task to clean up rate limiter state
            let limiter = config.limiter().clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                    limiter.retain_recent();
                }
            });

            limited_routes = limited_routes.layer(GovernorLayer { config });
        }
        None => {
            tracing::warn!("Invalid rate limit settings, serving without rate limiting");
        }
    }

    // Public routes (no rate limiting)
    let public_routes = Router::new()
        .route("/api/presence", axum::routing::get(api::get_presence))
        .route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(limited_routes)
        .merge(public_routes)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
