//! Loading helpers shared by the services that act on the current question.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    dao::{
        live_store::LiveStore,
        models::{BuzzKind, BuzzerEventEntity, PlayerEntity, QuestionEntity, SessionEntity, SessionStatus},
    },
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState,
        catalog::{CatalogEntry, MatchCatalog},
        now_ms,
    },
};

/// Running session with the question it currently points at.
pub struct LiveQuestion {
    /// Store the session was read from.
    pub store: Arc<dyn LiveStore>,
    /// Session as last read.
    pub session: SessionEntity,
    /// Catalog the question was resolved in.
    pub catalog: Arc<MatchCatalog>,
    /// Catalog entry of the current question.
    pub entry: CatalogEntry,
}

/// Session of a match, rejected unless running.
pub async fn running_session(
    state: &SharedState,
    match_id: Uuid,
) -> Result<(Arc<dyn LiveStore>, SessionEntity), ServiceError> {
    let store = state.require_store().await?;
    let session = state.session(match_id).await?;
    if session.status != SessionStatus::Running {
        return Err(ServiceError::InvalidState("session is not running".into()));
    }
    Ok((store, session))
}

/// Running session and its current question.
pub async fn live_question(
    state: &SharedState,
    match_id: Uuid,
) -> Result<LiveQuestion, ServiceError> {
    let (store, session) = running_session(state, match_id).await?;
    let question_id = session
        .current_question
        .ok_or_else(|| ServiceError::InvalidState("no active question".into()))?;
    let catalog = state.catalog(match_id).await?;
    let entry = catalog
        .get(question_id)
        .cloned()
        .ok_or_else(|| ServiceError::NotFound(format!("question {question_id}")))?;

    Ok(LiveQuestion {
        store,
        session,
        catalog,
        entry,
    })
}

/// A seated player of the match.
pub async fn find_player(
    store: &Arc<dyn LiveStore>,
    match_id: Uuid,
    player_id: Uuid,
) -> Result<PlayerEntity, ServiceError> {
    store
        .list_players(match_id)
        .await?
        .into_iter()
        .find(|player| player.id == player_id)
        .ok_or_else(|| ServiceError::NotFound(format!("player {player_id}")))
}

/// Seated player of a given seat, if any.
pub async fn player_at_seat(
    store: &Arc<dyn LiveStore>,
    match_id: Uuid,
    seat: u8,
) -> Result<Option<PlayerEntity>, ServiceError> {
    Ok(store
        .list_players(match_id)
        .await?
        .into_iter()
        .find(|player| player.seat == seat))
}

/// Write a question, drop the cached catalog and publish the change.
pub async fn persist_question(
    state: &SharedState,
    store: &Arc<dyn LiveStore>,
    question: QuestionEntity,
) -> Result<(), ServiceError> {
    store.save_question(question.clone()).await?;
    state.invalidate_catalog(question.match_id);
    sse_events::broadcast_question(state, &question);
    Ok(())
}

/// Open a new buzzer epoch on a question.
pub async fn insert_reset(
    state: &SharedState,
    store: &Arc<dyn LiveStore>,
    match_id: Uuid,
    question_id: Uuid,
) -> Result<BuzzerEventEntity, ServiceError> {
    let id = Uuid::new_v4();
    let marker = BuzzerEventEntity {
        id,
        match_id,
        question_id,
        player_id: None,
        event_type: BuzzKind::Reset,
        result: None,
        epoch_id: Some(id),
        occurred_at: now_ms(),
    };
    store.append_buzzer_event(marker.clone()).await?;
    sse_events::broadcast_buzzer_event(state, &marker);
    Ok(marker)
}
