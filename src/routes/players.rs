//! Participant roster endpoint.

use axum::Json;
use axum::extract::State;
use envelope::Participant;

use crate::state::AppState;

/// `GET /players`: every joined participant, one entry per id.
pub async fn list_players(State(state): State<AppState>) -> Json<Vec<Participant>> {
    Json(state.roster().await)
}
