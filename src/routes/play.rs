use std::collections::HashMap;

use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Request},
    middleware::{self, Next},
    response::Response,
    routing::post,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::play::{
        DeclareStarRequest, PackageResponse, SelectPackageRequest, SignalRequest, SignalResponse,
        StarResponse, SubmitAnswerRequest, SubmitAnswerResponse,
    },
    error::AppError,
    services::{
        access::{self, Contestant},
        answer_service, buzzer_service, finish_service,
    },
    state::SharedState,
};

const JOIN_CODE_HEADER: &str = "x-join-code";
const PASSWORD_HEADER: &str = "x-contestant-password";
const PLAYER_HEADER: &str = "x-player-id";

/// Contestant endpoints, authenticated with the session join code and password.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/play/matches/{match_id}/signal", post(signal))
        .route("/play/matches/{match_id}/answers", post(submit_answer))
        .route("/play/matches/{match_id}/package", post(select_package))
        .route(
            "/play/matches/{match_id}/star",
            post(declare_star).delete(withdraw_star),
        )
        .route_layer(middleware::from_fn_with_state(state, require_contestant))
}

/// Buzz, steal or self-test the buzzer.
#[utoipa::path(
    post,
    path = "/play/matches/{match_id}/signal",
    tag = "play",
    params(
        ("X-Join-Code" = String, Header, description = "Session join code"),
        ("X-Contestant-Password" = String, Header, description = "Contestant password"),
        ("X-Player-Id" = Uuid, Header, description = "Seated player identifier"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = SignalRequest,
    responses(
        (status = 200, description = "Signal recorded", body = SignalResponse),
        (status = 409, description = "Buzzer closed or not this player's turn")
    )
)]
pub async fn signal(
    State(state): State<SharedState>,
    Extension(contestant): Extension<Contestant>,
    Json(payload): Json<SignalRequest>,
) -> Result<Json<SignalResponse>, AppError> {
    Ok(Json(
        buzzer_service::signal(
            &state,
            contestant.match_id,
            contestant.player_id,
            payload.kind,
        )
        .await?,
    ))
}

/// Submit an answer to the current question.
#[utoipa::path(
    post,
    path = "/play/matches/{match_id}/answers",
    tag = "play",
    params(
        ("X-Join-Code" = String, Header, description = "Session join code"),
        ("X-Contestant-Password" = String, Header, description = "Contestant password"),
        ("X-Player-Id" = Uuid, Header, description = "Seated player identifier"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer accepted", body = SubmitAnswerResponse),
        (status = 409, description = "Answers closed, time's up or not this player's turn")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Extension(contestant): Extension<Contestant>,
    Valid(Json(payload)): Valid<Json<SubmitAnswerRequest>>,
) -> Result<Json<SubmitAnswerResponse>, AppError> {
    Ok(Json(
        answer_service::submit(
            &state,
            contestant.match_id,
            contestant.player_id,
            &payload.text,
        )
        .await?,
    ))
}

/// Choose the values of the three finish-round questions.
#[utoipa::path(
    post,
    path = "/play/matches/{match_id}/package",
    tag = "play",
    params(
        ("X-Join-Code" = String, Header, description = "Session join code"),
        ("X-Contestant-Password" = String, Header, description = "Contestant password"),
        ("X-Player-Id" = Uuid, Header, description = "Seated player identifier"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = SelectPackageRequest,
    responses(
        (status = 200, description = "Package drawn", body = PackageResponse),
        (status = 409, description = "Pool exhausted or slot already in play")
    )
)]
pub async fn select_package(
    State(state): State<SharedState>,
    Extension(contestant): Extension<Contestant>,
    Valid(Json(payload)): Valid<Json<SelectPackageRequest>>,
) -> Result<Json<PackageResponse>, AppError> {
    Ok(Json(
        finish_service::select_package(
            &state,
            contestant.match_id,
            contestant.player_id,
            payload.values,
        )
        .await?,
    ))
}

/// Put the player's single star on one of their finish questions.
#[utoipa::path(
    post,
    path = "/play/matches/{match_id}/star",
    tag = "play",
    params(
        ("X-Join-Code" = String, Header, description = "Session join code"),
        ("X-Contestant-Password" = String, Header, description = "Contestant password"),
        ("X-Player-Id" = Uuid, Header, description = "Seated player identifier"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = DeclareStarRequest,
    responses(
        (status = 200, description = "Star declared", body = StarResponse),
        (status = 409, description = "Star already used or question already decided")
    )
)]
pub async fn declare_star(
    State(state): State<SharedState>,
    Extension(contestant): Extension<Contestant>,
    Json(payload): Json<DeclareStarRequest>,
) -> Result<Json<StarResponse>, AppError> {
    Ok(Json(
        finish_service::declare_star(
            &state,
            contestant.match_id,
            contestant.player_id,
            payload.question_id,
        )
        .await?,
    ))
}

/// Take back a star that has not been played yet.
#[utoipa::path(
    delete,
    path = "/play/matches/{match_id}/star",
    tag = "play",
    params(
        ("X-Join-Code" = String, Header, description = "Session join code"),
        ("X-Contestant-Password" = String, Header, description = "Contestant password"),
        ("X-Player-Id" = Uuid, Header, description = "Seated player identifier"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    responses(
        (status = 200, description = "Star withdrawn", body = StarResponse),
        (status = 404, description = "No pending star")
    )
)]
pub async fn withdraw_star(
    State(state): State<SharedState>,
    Extension(contestant): Extension<Contestant>,
) -> Result<Json<StarResponse>, AppError> {
    Ok(Json(
        finish_service::withdraw_star(&state, contestant.match_id, contestant.player_id).await?,
    ))
}

fn header(headers: &HeaderMap, name: &str) -> Result<String, AppError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| AppError::Unauthorized(format!("missing header `{name}`")))
}

/// Resolve the contestant from the session credentials and hand it to the handler.
async fn require_contestant(
    State(state): State<SharedState>,
    Path(params): Path<HashMap<String, String>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let match_id = params
        .get("match_id")
        .and_then(|raw| raw.parse::<Uuid>().ok())
        .ok_or_else(|| AppError::BadRequest("invalid match id".into()))?;

    let headers = req.headers();
    let join_code = header(headers, JOIN_CODE_HEADER)?;
    let password = header(headers, PASSWORD_HEADER)?;
    let player_id = header(headers, PLAYER_HEADER)?
        .parse::<Uuid>()
        .map_err(|_| AppError::Unauthorized("invalid player id".into()))?;

    let contestant =
        access::authenticate_contestant(&state, match_id, &join_code, &password, player_id)
            .await?;
    req.extensions_mut().insert(contestant);
    Ok(next.run(req).await)
}
