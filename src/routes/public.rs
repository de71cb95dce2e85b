use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::{common::ScoreboardRow, public::PublicStateResponse},
    error::AppError,
    services::{public_service, scoring_service},
    state::SharedState,
};

/// Public read-only endpoints for guest displays and contestant screens.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/public/matches/{match_id}/state", get(public_state))
        .route("/public/matches/{match_id}/scoreboard", get(scoreboard))
}

#[utoipa::path(
    get,
    path = "/public/matches/{match_id}/state",
    tag = "public",
    params(("match_id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Session, current question, scoreboard and obstacle board", body = PublicStateResponse),
        (status = 404, description = "Unknown match")
    )
)]
/// Return what a guest display renders; answers stay hidden until revealed.
pub async fn public_state(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<PublicStateResponse>, AppError> {
    Ok(Json(public_service::public_state(&state, match_id).await?))
}

#[utoipa::path(
    get,
    path = "/public/matches/{match_id}/scoreboard",
    tag = "public",
    params(("match_id" = Uuid, Path, description = "Match identifier")),
    responses((status = 200, description = "Per-round totals in seat order", body = [ScoreboardRow]))
)]
/// Return the scoreboard alone.
pub async fn scoreboard(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<Vec<ScoreboardRow>>, AppError> {
    Ok(Json(scoring_service::scoreboard(&state, match_id).await?))
}
