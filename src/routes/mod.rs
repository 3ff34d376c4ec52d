//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the websocket relay, the participant roster, a health probe and the
//! Prometheus scrape endpoint under one Axum router. CORS is permissive so
//! browser clients served from another origin can read the roster.

pub mod players;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::telemetry;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let prometheus = telemetry::handle();

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/players", get(players::list_players))
        .route("/healthz", get(healthz))
        .route(
            "/metrics",
            get(move || {
                let handle = prometheus.clone();
                async move { handle.render() }
            }),
        )
        .route_layer(middleware::from_fn(telemetry::track_http))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
