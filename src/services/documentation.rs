use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Olympia Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::match_stream,
        crate::routes::public::public_state,
        crate::routes::public::scoreboard,
        crate::routes::moderator::list_matches,
        crate::routes::moderator::register_match,
        crate::routes::moderator::import_questions,
        crate::routes::moderator::snapshot,
        crate::routes::moderator::open_session,
        crate::routes::moderator::end_session,
        crate::routes::moderator::reset_session,
        crate::routes::moderator::select_round,
        crate::routes::moderator::select_question,
        crate::routes::moderator::advance,
        crate::routes::moderator::show_question,
        crate::routes::moderator::hide_question,
        crate::routes::moderator::set_target,
        crate::routes::moderator::resolve_obstacle_clue,
        crate::routes::moderator::list_answers,
        crate::routes::moderator::buzzer_state,
        crate::routes::moderator::start_timer,
        crate::routes::moderator::expire_timer,
        crate::routes::moderator::record_decision,
        crate::routes::moderator::record_decisions_batch,
        crate::routes::moderator::scoreboard,
        crate::routes::moderator::history,
        crate::routes::moderator::manual_adjust,
        crate::routes::moderator::set_total,
        crate::routes::moderator::undo_last,
        crate::routes::moderator::reset_scores,
        crate::routes::moderator::toggle_buzzer,
        crate::routes::moderator::toggle_overlay,
        crate::routes::moderator::send_media_command,
        crate::routes::play::signal,
        crate::routes::play::submit_answer,
        crate::routes::play::select_package,
        crate::routes::play::declare_star,
        crate::routes::play::withdraw_star,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::common::SessionView,
            crate::dto::common::PlayerView,
            crate::dto::common::QuestionView,
            crate::dto::common::QuestionSummary,
            crate::dto::common::BuzzerEventView,
            crate::dto::common::ScoreboardRow,
            crate::dto::common::ScoreChangeView,
            crate::dto::public::PublicStateResponse,
            crate::dto::public::ObstacleClueView,
            crate::dto::moderator::PlayerInput,
            crate::dto::moderator::RegisterMatchRequest,
            crate::dto::moderator::MatchResponse,
            crate::dto::moderator::QuestionRow,
            crate::dto::moderator::ImportQuestionsRequest,
            crate::dto::moderator::ImportSummary,
            crate::dto::moderator::OpenSessionResponse,
            crate::dto::moderator::SnapshotResponse,
            crate::dto::moderator::SelectRoundRequest,
            crate::dto::moderator::SelectQuestionRequest,
            crate::dto::moderator::AdvanceRequest,
            crate::dto::moderator::AdvanceResponse,
            crate::dto::moderator::SetTargetRequest,
            crate::dto::moderator::StartTimerRequest,
            crate::dto::moderator::TimerResponse,
            crate::dto::moderator::DecisionRequest,
            crate::dto::moderator::DecisionItem,
            crate::dto::moderator::DecisionResponse,
            crate::dto::moderator::TransferView,
            crate::dto::moderator::BatchDecisionRequest,
            crate::dto::moderator::BatchDecisionResponse,
            crate::dto::moderator::ManualAdjustRequest,
            crate::dto::moderator::SetTotalRequest,
            crate::dto::moderator::ScoreUpdateResponse,
            crate::dto::moderator::UndoResponse,
            crate::dto::moderator::ResetScoresResponse,
            crate::dto::moderator::ToggleBuzzerRequest,
            crate::dto::moderator::ToggleOverlayRequest,
            crate::dto::moderator::MediaCommandRequest,
            crate::dto::moderator::AnswerView,
            crate::dto::moderator::BuzzerStateResponse,
            crate::dto::play::SignalKind,
            crate::dto::play::SignalRequest,
            crate::dto::play::SignalResponse,
            crate::dto::play::SubmitAnswerRequest,
            crate::dto::play::SubmitAnswerResponse,
            crate::dto::play::SelectPackageRequest,
            crate::dto::play::PackageSlotView,
            crate::dto::play::PackageResponse,
            crate::dto::play::DeclareStarRequest,
            crate::dto::play::StarResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::ChangeKind,
            crate::dto::sse::ChangeEvent,
            crate::dao::models::MatchStatus,
            crate::dao::models::RoundKind,
            crate::dao::models::SessionStatus,
            crate::dao::models::QuestionState,
            crate::dao::models::BuzzKind,
            crate::dao::models::BuzzResult,
            crate::dao::models::StarOutcome,
            crate::dao::models::ScoreChangeSource,
            crate::dao::models::OverlayKind,
            crate::dao::models::OverlayFlags,
            crate::dao::models::MediaChannel,
            crate::dao::models::MediaAction,
            crate::dao::models::MediaCommand,
            crate::dao::models::GuestMediaControl,
            crate::scoring::Decision,
            crate::state::catalog::Direction,
            crate::services::access::ViewerRole,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent change streams per match"),
        (name = "public", description = "Read models for guest displays"),
        (name = "moderator", description = "Match setup and live control, guarded by a moderator token"),
        (name = "play", description = "Contestant actions, guarded by session credentials"),
    )
)]
/// OpenAPI document of every route.
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_tree_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/sse/matches/{match_id}",
            "/public/matches/{match_id}/state",
            "/moderator/matches/{match_id}/decisions",
            "/play/matches/{match_id}/star",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
