//! DTO definitions used by the moderator REST API and documentation layer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{
        MatchStatus, MediaAction, MediaChannel, OverlayKind, QuestionState, RoundKind,
    },
    dto::{
        common::{
            BuzzerEventView, PlayerView, QuestionSummary, QuestionView, SessionView,
        },
        validation::{validate_not_blank, validate_seats},
    },
    scoring::Decision,
    state::catalog::Direction,
};

/// Roster entry of a new match.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PlayerInput {
    pub seat: u8,
    #[validate(length(min = 1, max = 60))]
    pub display_name: String,
}

/// Payload registering a match with its roster.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterMatchRequest {
    pub name: String,
    pub players: Vec<PlayerInput>,
}

impl Validate for RegisterMatchRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_not_blank(&self.name) {
            errors.add("name", e);
        }

        let seats: Vec<u8> = self.players.iter().map(|player| player.seat).collect();
        if let Err(e) = validate_seats(&seats) {
            errors.add("players", e);
        }

        for player in &self.players {
            if let Err(player_errors) = player.validate() {
                errors.merge_self("players", Err(player_errors));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Registered match with its seats.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchResponse {
    pub id: Uuid,
    pub name: String,
    pub status: MatchStatus,
    pub players: Vec<PlayerView>,
}

/// One question-bank row. Codes decide the round.
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct QuestionRow {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub text: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub answer: String,
    #[serde(default)]
    #[validate(url)]
    pub media_url: Option<String>,
    /// Optional explicit point value, checked against the code for pool items.
    #[serde(default)]
    pub value: Option<u8>,
}

/// Question set assigned to a match.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ImportQuestionsRequest {
    #[validate(length(min = 1), nested)]
    pub rows: Vec<QuestionRow>,
}

/// Counts of what an import produced.
#[derive(Debug, Serialize, ToSchema)]
pub struct ImportSummary {
    pub questions: usize,
    pub pool_items: usize,
    pub finish_slots: usize,
}

/// Credentials issued when a session opens. Passwords are only ever shown here.
#[derive(Debug, Serialize, ToSchema)]
pub struct OpenSessionResponse {
    pub join_code: String,
    pub contestant_password: String,
    pub observer_password: String,
    pub session: SessionView,
}

/// Moderator view of a session.
#[derive(Debug, Serialize, ToSchema)]
pub struct SnapshotResponse {
    pub session: SessionView,
    pub join_code: Option<String>,
    pub current_question: Option<QuestionView>,
    pub players: Vec<PlayerView>,
    pub questions: Vec<QuestionSummary>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectRoundRequest {
    pub round: RoundKind,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectQuestionRequest {
    pub question_id: Uuid,
    #[serde(default)]
    pub auto_show: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdvanceRequest {
    pub direction: Direction,
    #[serde(default)]
    pub auto_show: bool,
}

/// Where navigation landed.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdvanceResponse {
    pub question: QuestionView,
    pub auto_shown: bool,
    /// Navigation left a seat's personal questions and stopped in the waiting state.
    pub seat_boundary: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetTargetRequest {
    /// `null` clears the lock.
    pub player_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct StartTimerRequest {
    /// Falls back to the round default when omitted.
    #[serde(default)]
    #[validate(range(min = 1, max = 600_000))]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TimerResponse {
    pub deadline: i64,
    pub duration_ms: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DecisionRequest {
    pub player_id: Uuid,
    pub decision: Decision,
}

/// Ledger effect on a second player, such as a steal transfer.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct TransferView {
    pub player_id: Uuid,
    pub delta: i32,
    pub new_total: i32,
}

/// Result of one decision.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct DecisionResponse {
    pub player_id: Uuid,
    pub requested_delta: i32,
    /// Delta after the zero floor.
    pub delta: i32,
    /// Round total of the player after the decision.
    pub new_total: i32,
    pub question_state: QuestionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferView>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DecisionItem {
    pub player_id: Uuid,
    pub decision: Decision,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct BatchDecisionRequest {
    #[validate(length(min = 1, max = 4))]
    pub items: Vec<DecisionItem>,
    /// Confirmed finishing order for speed-round ranking; defaults to response time.
    #[serde(default)]
    pub order: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchDecisionResponse {
    pub results: Vec<DecisionResponse>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ManualAdjustRequest {
    pub player_id: Uuid,
    pub round: RoundKind,
    pub delta: i32,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SetTotalRequest {
    pub player_id: Uuid,
    pub round: RoundKind,
    #[validate(range(min = 0))]
    pub total: i32,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Ledger row after a manual edit.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreUpdateResponse {
    pub change_id: Uuid,
    pub player_id: Uuid,
    pub round: RoundKind,
    pub requested_delta: i32,
    pub applied_delta: i32,
    pub points_before: i32,
    pub points_after: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UndoResponse {
    /// Change that was reverted.
    pub reverted: Uuid,
    /// Reversal entry.
    pub revert_id: Uuid,
    pub player_id: Uuid,
    pub round: RoundKind,
    pub applied_delta: i32,
    pub points_after: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResetScoresResponse {
    pub cleared_rows: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ToggleBuzzerRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ToggleOverlayRequest {
    pub kind: OverlayKind,
    pub enabled: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MediaCommandRequest {
    pub channel: MediaChannel,
    pub action: MediaAction,
}

/// Submission as reviewed by the moderator.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerView {
    pub id: Uuid,
    pub player_id: Uuid,
    pub text: String,
    pub submitted_at: i64,
    pub response_time_ms: Option<i64>,
    pub is_correct: Option<bool>,
    pub points_awarded: Option<i32>,
}

/// Epoch-filtered buzzer log of a question.
#[derive(Debug, Serialize, ToSchema)]
pub struct BuzzerStateResponse {
    pub question_id: Uuid,
    /// Reset marker opening the current epoch.
    pub reset: Option<BuzzerEventView>,
    /// Signals of the current epoch in commit order.
    pub events: Vec<BuzzerEventView>,
    pub winner: Option<BuzzerEventView>,
}
