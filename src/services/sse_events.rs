use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::{
        AnswerEntity, BuzzerEventEntity, PlayerEntity, QuestionEntity, ScoreChangeEntity,
        SessionEntity, StarUseEntity,
    },
    dto::{
        common::{BuzzerEventView, PlayerView, QuestionSummary, ScoreChangeView, SessionView},
        sse::{ChangeEvent, ChangeKind, ServerEvent, SystemStatus},
    },
    state::AppState,
};

const EVENT_CHANGE: &str = "change";
const EVENT_SYSTEM_STATUS: &str = "system.status";
const EVENT_TRIAL: &str = "buzzer.trial";

const ENTITY_SESSION: &str = "session";
const ENTITY_QUESTION: &str = "question";
const ENTITY_PLAYER: &str = "player";
const ENTITY_BUZZER_EVENT: &str = "buzzer_event";
const ENTITY_ANSWER: &str = "answer";
const ENTITY_SCORE_CHANGE: &str = "score_change";
const ENTITY_STAR: &str = "star_use";

/// Answer notice without the submitted text, which stays on moderator routes.
#[derive(Serialize)]
struct AnswerNotice {
    question_id: Uuid,
    player_id: Uuid,
    submitted_at: i64,
    response_time_ms: Option<i64>,
    is_correct: Option<bool>,
    points_awarded: Option<i32>,
}

#[derive(Serialize)]
struct TrialNotice {
    player_id: Uuid,
}

/// Publish a committed session transition.
pub fn broadcast_session(state: &AppState, session: &SessionEntity) {
    publish_change(
        state,
        session.match_id,
        ENTITY_SESSION,
        session.id.to_string(),
        ChangeKind::Updated,
        &SessionView::from(session),
    );
}

/// Publish a question write (target, value, resolution or slot payload).
pub fn broadcast_question(state: &AppState, question: &QuestionEntity) {
    publish_change(
        state,
        question.match_id,
        ENTITY_QUESTION,
        question.id.to_string(),
        ChangeKind::Updated,
        &QuestionSummary::from(question),
    );
}

/// Publish a player flag change.
pub fn broadcast_player(state: &AppState, player: &PlayerEntity) {
    publish_change(
        state,
        player.match_id,
        ENTITY_PLAYER,
        player.id.to_string(),
        ChangeKind::Updated,
        &PlayerView::from(player),
    );
}

/// Publish an appended buzzer log entry, reset markers included.
pub fn broadcast_buzzer_event(state: &AppState, event: &BuzzerEventEntity) {
    publish_change(
        state,
        event.match_id,
        ENTITY_BUZZER_EVENT,
        event.id.to_string(),
        ChangeKind::Created,
        &BuzzerEventView::from(event),
    );
}

/// Publish a submission or its grading.
pub fn broadcast_answer(state: &AppState, answer: &AnswerEntity, kind: ChangeKind) {
    let notice = AnswerNotice {
        question_id: answer.question_id,
        player_id: answer.player_id,
        submitted_at: answer.submitted_at,
        response_time_ms: answer.response_time_ms,
        is_correct: answer.is_correct,
        points_awarded: answer.points_awarded,
    };
    publish_change(
        state,
        answer.match_id,
        ENTITY_ANSWER,
        answer.id.to_string(),
        kind,
        &notice,
    );
}

/// Publish a ledger mutation.
pub fn broadcast_score_change(state: &AppState, change: &ScoreChangeEntity) {
    publish_change(
        state,
        change.match_id,
        ENTITY_SCORE_CHANGE,
        change.id.to_string(),
        ChangeKind::Created,
        &ScoreChangeView::from(change),
    );
}

/// Publish a star declaration, finalisation or withdrawal.
pub fn broadcast_star(state: &AppState, star: &StarUseEntity, kind: ChangeKind) {
    publish_change(
        state,
        star.match_id,
        ENTITY_STAR,
        star.id.to_string(),
        kind,
        star,
    );
}

/// Publish a buzzer self-test.
pub fn broadcast_trial(state: &AppState, match_id: Uuid, player_id: Uuid) {
    match ServerEvent::json(Some(EVENT_TRIAL.to_string()), &TrialNotice { player_id }) {
        Ok(event) => state.events().publish(match_id, event),
        Err(err) => warn!(event = EVENT_TRIAL, error = %err, "failed to serialize SSE payload"),
    }
}

/// Tell every match stream that storage went away or came back.
pub fn broadcast_system_status(state: &AppState, degraded: bool) {
    match ServerEvent::json(
        Some(EVENT_SYSTEM_STATUS.to_string()),
        &SystemStatus { degraded },
    ) {
        Ok(event) => state.events().publish_all(event),
        Err(err) => {
            warn!(event = EVENT_SYSTEM_STATUS, error = %err, "failed to serialize SSE payload")
        }
    }
}

fn publish_change(
    state: &AppState,
    match_id: Uuid,
    entity: &str,
    entity_id: String,
    kind: ChangeKind,
    payload: &impl Serialize,
) {
    let fields = match serde_json::to_value(payload) {
        Ok(Value::Object(fields)) => fields,
        Ok(other) => {
            let mut fields = Map::new();
            fields.insert("value".into(), other);
            fields
        }
        Err(err) => {
            warn!(entity, error = %err, "failed to flatten change payload");
            return;
        }
    };

    let change = ChangeEvent {
        entity: entity.to_string(),
        entity_id,
        kind,
        fields,
    };

    match ServerEvent::json(Some(EVENT_CHANGE.to_string()), &change) {
        Ok(event) => state.events().publish(match_id, event),
        Err(err) => warn!(entity, error = %err, "failed to serialize change event"),
    }
}
