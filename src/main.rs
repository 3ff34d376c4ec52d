//! Polydraw relay: fans websocket envelopes out to every other participant
//! and serves the participant roster.

mod config;
mod telemetry;
mod routes;
mod state;

use config::ServerConfig;

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt::init();
    match dotenv {
        Ok(path) => tracing::info!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env"),
    }

    let config = ServerConfig::from_env();
    let addr = config.socket_addr();
    let app = routes::app(state::AppState::new());
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    tracing::info!(%addr, "polydraw listening");
    axum::serve(listener, app).await.map_err(ServerError::Serve)
}
