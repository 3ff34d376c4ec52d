//! Prometheus instrumentation for the relay.
//!
//! DESIGN
//! ======
//! Handlers record through the `metrics` facade. A process-wide Prometheus
//! recorder is installed the first time [`handle`] is called and rendered at
//! `GET /metrics`. Until then every recording is a no-op.

use std::sync::OnceLock;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Handle to the installed recorder, installing it on first use.
pub fn handle() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if metrics::set_global_recorder(recorder).is_err() {
                tracing::warn!("metrics: another recorder is already installed");
            }
            handle
        })
        .clone()
}

/// Count and time every HTTP request by method, route and status.
pub async fn track_http(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_owned(), |path| path.as_str().to_owned());
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        "polydraw_http_requests_total",
        "method" => method.clone(),
        "endpoint" => endpoint.clone(),
        "status_code" => status
    )
    .increment(1);
    metrics::histogram!("polydraw_http_request_duration_seconds", "method" => method, "endpoint" => endpoint)
        .record(started.elapsed().as_secs_f64());
    response
}

/// Connection and player gauges.
pub mod gauges {
    pub fn connection_opened() {
        metrics::gauge!("polydraw_websocket_connections_active").increment(1.0);
        metrics::counter!("polydraw_websocket_connections_total").increment(1);
    }

    pub fn connection_closed() {
        metrics::gauge!("polydraw_websocket_connections_active").decrement(1.0);
    }

    pub fn player_joined() {
        metrics::gauge!("polydraw_players_active").increment(1.0);
        metrics::counter!("polydraw_players_joined_total").increment(1);
    }

    pub fn player_left() {
        metrics::gauge!("polydraw_players_active").decrement(1.0);
        metrics::counter!("polydraw_players_left_total").increment(1);
    }
}

/// Message and drawing counters.
pub mod counters {
    /// One inbound frame, labelled with its envelope type.
    pub fn message_received(message_type: &'static str) {
        metrics::counter!("polydraw_websocket_messages_received_total", "message_type" => message_type).increment(1);
    }

    /// One frame handed to a peer's outbox.
    pub fn message_sent() {
        metrics::counter!("polydraw_websocket_messages_sent_total").increment(1);
    }

    pub fn error(error_type: &'static str) {
        metrics::counter!("polydraw_websocket_errors_total", "error_type" => error_type).increment(1);
    }

    pub fn path(points: usize) {
        metrics::counter!("polydraw_path_events_total").increment(1);
        metrics::counter!("polydraw_path_points_total").increment(u64::try_from(points).unwrap_or(u64::MAX));
    }

    pub fn draw() {
        metrics::counter!("polydraw_draw_events_total").increment(1);
    }

    pub fn clear() {
        metrics::counter!("polydraw_clear_events_total").increment(1);
    }
}
