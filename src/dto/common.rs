use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{
        BuzzKind, BuzzResult, BuzzerEventEntity, GuestMediaControl, OverlayFlags, PlayerEntity,
        QuestionEntity, QuestionState, RoundKind, ScoreChangeEntity, ScoreChangeSource,
        SessionEntity, SessionStatus,
    },
    dto::format_timestamp_ms,
    state::catalog::{CatalogEntry, META_RESOLVED},
};

/// Session fields every viewer may see. Credentials never leave the moderator routes.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct SessionView {
    pub match_id: Uuid,
    pub status: SessionStatus,
    pub version: i64,
    pub current_round: Option<RoundKind>,
    pub current_question: Option<Uuid>,
    pub question_state: QuestionState,
    /// Unix milliseconds after which answers are refused.
    pub timer_deadline: Option<i64>,
    pub buzzer_enabled: bool,
    pub overlays: OverlayFlags,
    pub guest_media_control: GuestMediaControl,
    pub decided_players: Vec<Uuid>,
}

impl From<&SessionEntity> for SessionView {
    fn from(session: &SessionEntity) -> Self {
        Self {
            match_id: session.match_id,
            status: session.status,
            version: session.version,
            current_round: session.current_round,
            current_question: session.current_question,
            question_state: session.question_state,
            timer_deadline: session.timer_deadline,
            buzzer_enabled: session.buzzer_enabled,
            overlays: session.overlays,
            guest_media_control: session.guest_media_control,
            decided_players: session.decided_players.clone(),
        }
    }
}

/// Seat of a match.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct PlayerView {
    pub id: Uuid,
    pub seat: u8,
    pub display_name: String,
    pub is_disqualified_obstacle: bool,
}

impl From<&PlayerEntity> for PlayerView {
    fn from(player: &PlayerEntity) -> Self {
        Self {
            id: player.id,
            seat: player.seat,
            display_name: player.display_name.clone(),
            is_disqualified_obstacle: player.is_disqualified_obstacle,
        }
    }
}

/// Full question payload; `answer` is withheld on public projections until revealed.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct QuestionView {
    pub id: Uuid,
    pub round: RoundKind,
    pub position: u32,
    pub code: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub media_url: Option<String>,
    pub target_player: Option<Uuid>,
    pub value: Option<u8>,
    pub resolved: bool,
}

impl QuestionView {
    /// Project a catalog entry, including the answer only when `with_answer` is set.
    pub fn from_entry(entry: &CatalogEntry, with_answer: bool) -> Self {
        let question = &entry.question;
        Self {
            id: question.id,
            round: question.round,
            position: question.position,
            code: entry.code.to_string(),
            text: question.text.clone(),
            answer: with_answer.then(|| question.answer.clone()),
            media_url: question.media_url.clone(),
            target_player: question.target_player,
            value: question.value,
            resolved: entry.is_resolved(),
        }
    }
}

/// Question fields without text or answer, safe for every subscriber.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct QuestionSummary {
    pub id: Uuid,
    pub round: RoundKind,
    pub position: u32,
    pub code: String,
    pub target_player: Option<Uuid>,
    pub value: Option<u8>,
    pub resolved: bool,
}

impl From<&QuestionEntity> for QuestionSummary {
    fn from(question: &QuestionEntity) -> Self {
        Self {
            id: question.id,
            round: question.round,
            position: question.position,
            code: question.code.clone(),
            target_player: question.target_player,
            value: question.value,
            resolved: question
                .meta
                .get(META_RESOLVED)
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
        }
    }
}

/// Buzzer log entry as exposed to clients.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct BuzzerEventView {
    pub id: Uuid,
    pub question_id: Uuid,
    pub player_id: Option<Uuid>,
    pub event_type: BuzzKind,
    pub result: Option<BuzzResult>,
    pub epoch_id: Option<Uuid>,
    pub occurred_at: i64,
}

impl From<&BuzzerEventEntity> for BuzzerEventView {
    fn from(event: &BuzzerEventEntity) -> Self {
        Self {
            id: event.id,
            question_id: event.question_id,
            player_id: event.player_id,
            event_type: event.event_type,
            result: event.result,
            epoch_id: event.epoch_id,
            occurred_at: event.occurred_at,
        }
    }
}

/// Points of one player per round.
#[derive(Debug, Serialize, ToSchema, Clone, Default, PartialEq, Eq)]
pub struct ScoreboardRow {
    pub player_id: Uuid,
    pub seat: u8,
    pub display_name: String,
    pub opening: i32,
    pub obstacle: i32,
    pub speed: i32,
    pub finish: i32,
    pub total: i32,
}

impl ScoreboardRow {
    /// Record the points of a round and refresh the total.
    pub fn set_round(&mut self, round: RoundKind, points: i32) {
        match round {
            RoundKind::Opening => self.opening = points,
            RoundKind::Obstacle => self.obstacle = points,
            RoundKind::Speed => self.speed = points,
            RoundKind::Finish => self.finish = points,
        }
        self.total = self.opening + self.obstacle + self.speed + self.finish;
    }

    /// Points of a single round.
    pub fn round(&self, round: RoundKind) -> i32 {
        match round {
            RoundKind::Opening => self.opening,
            RoundKind::Obstacle => self.obstacle,
            RoundKind::Speed => self.speed,
            RoundKind::Finish => self.finish,
        }
    }
}

/// Audit entry of a ledger mutation.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct ScoreChangeView {
    pub id: Uuid,
    pub player_id: Uuid,
    pub round: RoundKind,
    pub question_id: Option<Uuid>,
    pub source: ScoreChangeSource,
    pub requested_delta: i32,
    pub applied_delta: i32,
    pub points_before: i32,
    pub points_after: i32,
    pub reason: Option<String>,
    pub revert_of: Option<Uuid>,
    pub reverted_by: Option<Uuid>,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl From<&ScoreChangeEntity> for ScoreChangeView {
    fn from(change: &ScoreChangeEntity) -> Self {
        Self {
            id: change.id,
            player_id: change.player_id,
            round: change.round,
            question_id: change.question_id,
            source: change.source,
            requested_delta: change.requested_delta,
            applied_delta: change.applied_delta,
            points_before: change.points_before,
            points_after: change.points_after,
            reason: change.reason.clone(),
            revert_of: change.revert_of,
            reverted_by: change.reverted_by,
            created_at: format_timestamp_ms(change.created_at),
        }
    }
}
