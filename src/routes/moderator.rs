use std::collections::HashMap;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        common::{QuestionView, ScoreChangeView, ScoreboardRow, SessionView},
        moderator::{
            AdvanceRequest, AdvanceResponse, AnswerView, BatchDecisionRequest,
            BatchDecisionResponse, BuzzerStateResponse, DecisionRequest, DecisionResponse,
            ImportQuestionsRequest, ImportSummary, ManualAdjustRequest, MatchResponse,
            MediaCommandRequest, OpenSessionResponse, RegisterMatchRequest, ResetScoresResponse,
            ScoreUpdateResponse, SelectQuestionRequest, SelectRoundRequest, SetTargetRequest,
            SetTotalRequest, SnapshotResponse, StartTimerRequest, TimerResponse,
            ToggleBuzzerRequest, ToggleOverlayRequest, UndoResponse,
        },
    },
    error::AppError,
    services::{
        answer_service, buzzer_service, catalog_service, navigation_service,
        presentation_service, scoring_service, session_service,
    },
    state::SharedState,
};

/// Header carrying the moderator token checked by the access-control seam.
pub const MODERATOR_TOKEN_HEADER: &str = "x-moderator-token";

/// Moderator endpoints: match setup, session control, navigation, scoring and presentation.
pub fn router(state: SharedState) -> Router<SharedState> {
    let matches = Router::new()
        .route("/moderator/matches", get(list_matches).post(register_match))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_global_moderator,
        ));

    let scoped = Router::new()
        .route("/moderator/matches/{match_id}/questions", post(import_questions))
        .route("/moderator/matches/{match_id}/session", get(snapshot))
        .route("/moderator/matches/{match_id}/session/open", post(open_session))
        .route("/moderator/matches/{match_id}/session/end", post(end_session))
        .route("/moderator/matches/{match_id}/session/reset", post(reset_session))
        .route("/moderator/matches/{match_id}/round", post(select_round))
        .route("/moderator/matches/{match_id}/question/select", post(select_question))
        .route("/moderator/matches/{match_id}/question/advance", post(advance))
        .route("/moderator/matches/{match_id}/question/show", post(show_question))
        .route("/moderator/matches/{match_id}/question/hide", post(hide_question))
        .route(
            "/moderator/matches/{match_id}/questions/{question_id}/target",
            post(set_target),
        )
        .route(
            "/moderator/matches/{match_id}/questions/{question_id}/resolve",
            post(resolve_obstacle_clue),
        )
        .route(
            "/moderator/matches/{match_id}/questions/{question_id}/answers",
            get(list_answers),
        )
        .route(
            "/moderator/matches/{match_id}/questions/{question_id}/buzzer",
            get(buzzer_state),
        )
        .route("/moderator/matches/{match_id}/timer/start", post(start_timer))
        .route("/moderator/matches/{match_id}/timer/expire", post(expire_timer))
        .route("/moderator/matches/{match_id}/decisions", post(record_decision))
        .route(
            "/moderator/matches/{match_id}/decisions/batch",
            post(record_decisions_batch),
        )
        .route("/moderator/matches/{match_id}/scores", get(scoreboard))
        .route("/moderator/matches/{match_id}/scores/history", get(history))
        .route("/moderator/matches/{match_id}/scores/adjust", post(manual_adjust))
        .route("/moderator/matches/{match_id}/scores/total", post(set_total))
        .route("/moderator/matches/{match_id}/scores/undo", post(undo_last))
        .route("/moderator/matches/{match_id}/scores/reset", post(reset_scores))
        .route("/moderator/matches/{match_id}/buzzer", post(toggle_buzzer))
        .route("/moderator/matches/{match_id}/overlay", post(toggle_overlay))
        .route("/moderator/matches/{match_id}/media", post(send_media_command))
        .route_layer(middleware::from_fn_with_state(state, require_match_moderator));

    matches.merge(scoped)
}

/// List every registered match.
#[utoipa::path(
    get,
    path = "/moderator/matches",
    tag = "moderator",
    params(("X-Moderator-Token" = String, Header, description = "Moderator token with a global grant")),
    responses((status = 200, description = "Registered matches", body = [MatchResponse]))
)]
pub async fn list_matches(
    State(state): State<SharedState>,
) -> Result<Json<Vec<MatchResponse>>, AppError> {
    Ok(Json(catalog_service::list_matches(&state).await?))
}

/// Register a match with its seated players.
#[utoipa::path(
    post,
    path = "/moderator/matches",
    tag = "moderator",
    params(("X-Moderator-Token" = String, Header, description = "Moderator token with a global grant")),
    request_body = RegisterMatchRequest,
    responses(
        (status = 200, description = "Match registered", body = MatchResponse),
        (status = 400, description = "Invalid roster")
    )
)]
pub async fn register_match(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<RegisterMatchRequest>>,
) -> Result<Json<MatchResponse>, AppError> {
    Ok(Json(catalog_service::register_match(&state, payload).await?))
}

/// Replace the question set of a match.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/questions",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = ImportQuestionsRequest,
    responses(
        (status = 200, description = "Questions imported", body = ImportSummary),
        (status = 400, description = "Malformed or duplicate codes"),
        (status = 409, description = "Session is running")
    )
)]
pub async fn import_questions(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ImportQuestionsRequest>>,
) -> Result<Json<ImportSummary>, AppError> {
    Ok(Json(
        catalog_service::import_questions(&state, match_id, payload).await?,
    ))
}

/// Moderator snapshot of the session, including the join code and answers.
#[utoipa::path(
    get,
    path = "/moderator/matches/{match_id}/session",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    responses((status = 200, description = "Session snapshot", body = SnapshotResponse))
)]
pub async fn snapshot(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<SnapshotResponse>, AppError> {
    Ok(Json(session_service::snapshot(&state, match_id).await?))
}

/// Open the session and issue fresh credentials.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/session/open",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    responses((status = 200, description = "Session opened", body = OpenSessionResponse))
)]
pub async fn open_session(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<OpenSessionResponse>, AppError> {
    Ok(Json(session_service::open_session(&state, match_id).await?))
}

/// End the session and revoke its credentials.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/session/end",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    responses((status = 200, description = "Session ended", body = SessionView))
)]
pub async fn end_session(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::end_session(&state, match_id).await?))
}

/// Clear disqualifications, buzzer, timer and decisions without touching scores.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/session/reset",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    responses((status = 200, description = "Transient state cleared", body = SessionView))
)]
pub async fn reset_session(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(
        session_service::reset_session_state(&state, match_id).await?,
    ))
}

/// Enter a round.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/round",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = SelectRoundRequest,
    responses((status = 200, description = "Round selected", body = SessionView))
)]
pub async fn select_round(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
    Json(payload): Json<SelectRoundRequest>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(
        navigation_service::select_round(&state, match_id, payload.round).await?,
    ))
}

/// Make a question current, opening a new buzzer epoch.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/question/select",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = SelectQuestionRequest,
    responses((status = 200, description = "Question selected", body = QuestionView))
)]
pub async fn select_question(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
    Json(payload): Json<SelectQuestionRequest>,
) -> Result<Json<QuestionView>, AppError> {
    Ok(Json(
        navigation_service::select_question(
            &state,
            match_id,
            payload.question_id,
            payload.auto_show,
        )
        .await?,
    ))
}

/// Move to the next or previous question of the current round.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/question/advance",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = AdvanceRequest,
    responses(
        (status = 200, description = "Navigation landed", body = AdvanceResponse),
        (status = 409, description = "No question in that direction")
    )
)]
pub async fn advance(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
    Json(payload): Json<AdvanceRequest>,
) -> Result<Json<AdvanceResponse>, AppError> {
    Ok(Json(
        navigation_service::advance(&state, match_id, payload.direction, payload.auto_show)
            .await?,
    ))
}

/// Put the current question on screen.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/question/show",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    responses((status = 200, description = "Question displayed", body = SessionView))
)]
pub async fn show_question(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(navigation_service::show_question(&state, match_id).await?))
}

/// Take the current question off screen.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/question/hide",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    responses((status = 200, description = "Question hidden", body = SessionView))
)]
pub async fn hide_question(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(navigation_service::hide_question(&state, match_id).await?))
}

/// Lock a question to one player, or clear the lock.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/questions/{question_id}/target",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier"),
        ("question_id" = Uuid, Path, description = "Question identifier")
    ),
    request_body = SetTargetRequest,
    responses((status = 200, description = "Target updated", body = QuestionView))
)]
pub async fn set_target(
    State(state): State<SharedState>,
    Path((match_id, question_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<SetTargetRequest>,
) -> Result<Json<QuestionView>, AppError> {
    Ok(Json(
        navigation_service::set_target(&state, match_id, question_id, payload.player_id).await?,
    ))
}

/// Open an obstacle sub-clue on the board.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/questions/{question_id}/resolve",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier"),
        ("question_id" = Uuid, Path, description = "Obstacle sub-clue identifier")
    ),
    responses((status = 200, description = "Clue resolved", body = QuestionView))
)]
pub async fn resolve_obstacle_clue(
    State(state): State<SharedState>,
    Path((match_id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<QuestionView>, AppError> {
    Ok(Json(
        navigation_service::resolve_obstacle_clue(&state, match_id, question_id).await?,
    ))
}

/// Submissions for a question, in submission order.
#[utoipa::path(
    get,
    path = "/moderator/matches/{match_id}/questions/{question_id}/answers",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier"),
        ("question_id" = Uuid, Path, description = "Question identifier")
    ),
    responses((status = 200, description = "Submitted answers", body = [AnswerView]))
)]
pub async fn list_answers(
    State(state): State<SharedState>,
    Path((match_id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<AnswerView>>, AppError> {
    Ok(Json(
        answer_service::list_answers(&state, match_id, question_id).await?,
    ))
}

/// Buzzer log of the current epoch and its winner.
#[utoipa::path(
    get,
    path = "/moderator/matches/{match_id}/questions/{question_id}/buzzer",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier"),
        ("question_id" = Uuid, Path, description = "Question identifier")
    ),
    responses((status = 200, description = "Epoch-filtered buzzer state", body = BuzzerStateResponse))
)]
pub async fn buzzer_state(
    State(state): State<SharedState>,
    Path((match_id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<BuzzerStateResponse>, AppError> {
    Ok(Json(
        buzzer_service::buzzer_state(&state, match_id, question_id).await?,
    ))
}

/// Start the answer timer; the duration defaults to the round rule.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/timer/start",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = StartTimerRequest,
    responses((status = 200, description = "Timer running", body = TimerResponse))
)]
pub async fn start_timer(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<StartTimerRequest>>,
) -> Result<Json<TimerResponse>, AppError> {
    Ok(Json(
        navigation_service::start_timer(&state, match_id, payload.duration_ms).await?,
    ))
}

/// Expire the answer timer now.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/timer/expire",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    responses((status = 200, description = "Timer expired", body = SessionView))
)]
pub async fn expire_timer(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(navigation_service::expire_timer(&state, match_id).await?))
}

/// Record a correct/wrong/timeout verdict for one player on the current question.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/decisions",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Decision scored", body = DecisionResponse),
        (status = 409, description = "Question not open for decisions or already decided")
    )
)]
pub async fn record_decision(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, AppError> {
    Ok(Json(
        scoring_service::record_decision(&state, match_id, payload.player_id, payload.decision)
            .await?,
    ))
}

/// Record several verdicts at once; speed-round awards follow the finishing order.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/decisions/batch",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = BatchDecisionRequest,
    responses((status = 200, description = "Decisions scored", body = BatchDecisionResponse))
)]
pub async fn record_decisions_batch(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<BatchDecisionRequest>>,
) -> Result<Json<BatchDecisionResponse>, AppError> {
    Ok(Json(
        scoring_service::record_decisions_batch(&state, match_id, payload).await?,
    ))
}

/// Totals per player and round.
#[utoipa::path(
    get,
    path = "/moderator/matches/{match_id}/scores",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    responses((status = 200, description = "Per-round totals in seat order", body = [ScoreboardRow]))
)]
pub async fn scoreboard(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<Vec<ScoreboardRow>>, AppError> {
    Ok(Json(scoring_service::scoreboard(&state, match_id).await?))
}

/// Ledger audit trail, newest first.
#[utoipa::path(
    get,
    path = "/moderator/matches/{match_id}/scores/history",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    responses((status = 200, description = "Score changes", body = [ScoreChangeView]))
)]
pub async fn history(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<Vec<ScoreChangeView>>, AppError> {
    Ok(Json(scoring_service::history(&state, match_id).await?))
}

/// Apply a manual delta with a mandatory reason.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/scores/adjust",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = ManualAdjustRequest,
    responses(
        (status = 200, description = "Score adjusted", body = ScoreUpdateResponse),
        (status = 400, description = "Reason missing or too short")
    )
)]
pub async fn manual_adjust(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ManualAdjustRequest>>,
) -> Result<Json<ScoreUpdateResponse>, AppError> {
    Ok(Json(
        scoring_service::manual_adjust(&state, match_id, payload).await?,
    ))
}

/// Overwrite a round total with a mandatory reason.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/scores/total",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = SetTotalRequest,
    responses((status = 200, description = "Total set", body = ScoreUpdateResponse))
)]
pub async fn set_total(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SetTotalRequest>>,
) -> Result<Json<ScoreUpdateResponse>, AppError> {
    Ok(Json(scoring_service::set_total(&state, match_id, payload).await?))
}

/// Revert the most recent ledger change that has not been reverted yet.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/scores/undo",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    responses(
        (status = 200, description = "Change reverted", body = UndoResponse),
        (status = 409, description = "Nothing to undo")
    )
)]
pub async fn undo_last(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<UndoResponse>, AppError> {
    Ok(Json(scoring_service::undo_last(&state, match_id).await?))
}

/// Zero every score of the match.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/scores/reset",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    responses((status = 200, description = "All totals cleared", body = ResetScoresResponse))
)]
pub async fn reset_scores(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<ResetScoresResponse>, AppError> {
    Ok(Json(scoring_service::reset_scores(&state, match_id).await?))
}

/// Open or close the buzzer.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/buzzer",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = ToggleBuzzerRequest,
    responses((status = 200, description = "Buzzer toggled", body = SessionView))
)]
pub async fn toggle_buzzer(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
    Json(payload): Json<ToggleBuzzerRequest>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(
        presentation_service::toggle_buzzer(&state, match_id, payload.enabled).await?,
    ))
}

/// Show or hide a guest display overlay.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/overlay",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = ToggleOverlayRequest,
    responses((status = 200, description = "Overlay toggled", body = SessionView))
)]
pub async fn toggle_overlay(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
    Json(payload): Json<ToggleOverlayRequest>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(
        presentation_service::toggle_overlay(&state, match_id, payload.kind, payload.enabled)
            .await?,
    ))
}

/// Issue a play/pause/restart command to guest displays.
#[utoipa::path(
    post,
    path = "/moderator/matches/{match_id}/media",
    tag = "moderator",
    params(
        ("X-Moderator-Token" = String, Header, description = "Moderator token"),
        ("match_id" = Uuid, Path, description = "Match identifier")
    ),
    request_body = MediaCommandRequest,
    responses((status = 200, description = "Command issued", body = SessionView))
)]
pub async fn send_media_command(
    State(state): State<SharedState>,
    Path(match_id): Path<Uuid>,
    Json(payload): Json<MediaCommandRequest>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(
        presentation_service::send_media_command(&state, match_id, payload.channel, payload.action)
            .await?,
    ))
}

fn moderator_token(req: &Request<Body>) -> Result<String, AppError> {
    req.headers()
        .get(MODERATOR_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| {
            AppError::Unauthorized("missing moderator token header `X-Moderator-Token`".into())
        })
}

/// Registration and listing are not tied to a match; only global grants pass.
async fn require_global_moderator(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = moderator_token(&req)?;
    if state.access().is_moderator(&token, Uuid::nil()) {
        Ok(next.run(req).await)
    } else {
        Err(AppError::Unauthorized("invalid moderator token".into()))
    }
}

async fn require_match_moderator(
    State(state): State<SharedState>,
    Path(params): Path<HashMap<String, String>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let match_id = params
        .get("match_id")
        .and_then(|raw| raw.parse::<Uuid>().ok())
        .ok_or_else(|| AppError::BadRequest("invalid match id".into()))?;

    let token = moderator_token(&req)?;
    if state.access().is_moderator(&token, match_id) {
        Ok(next.run(req).await)
    } else {
        Err(AppError::Unauthorized(
            "moderator token does not cover this match".into(),
        ))
    }
}
