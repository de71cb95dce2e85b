//! Session lifecycle: open, end, transient reset and the moderator snapshot.

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{MatchStatus, SessionStatus},
    dto::{
        common::{PlayerView, QuestionSummary, QuestionView, SessionView},
        moderator::{OpenSessionResponse, SnapshotResponse},
    },
    error::ServiceError,
    services::{credentials, live::insert_reset, sse_events},
    state::{
        SharedState, now_ms,
        state_machine::{self, SessionEvent},
    },
};

/// Open (or re-open) the session, rotating its credentials.
///
/// The plain-text passwords only ever leave the server in this response.
pub async fn open_session(
    state: &SharedState,
    match_id: Uuid,
) -> Result<OpenSessionResponse, ServiceError> {
    let issued = credentials::issue();
    let stored = issued.stored.clone();

    let (session, ()) = state
        .mutate_session(match_id, |session| {
            let plan = state_machine::plan(session, SessionEvent::Open)?;
            plan.apply(session);
            session.credentials = Some(stored.clone());
            session.buzzer_enabled = false;
            session.timer_deadline = None;
            Ok(())
        })
        .await?;

    set_match_status(state, match_id, MatchStatus::Live).await?;

    info!(%match_id, version = session.version, "session opened");
    Ok(OpenSessionResponse {
        join_code: issued.join_code,
        contestant_password: issued.contestant_password,
        observer_password: issued.observer_password,
        session: SessionView::from(&session),
    })
}

/// End the session and revoke its credentials.
pub async fn end_session(state: &SharedState, match_id: Uuid) -> Result<SessionView, ServiceError> {
    let (session, ()) = state
        .mutate_session(match_id, |session| {
            let plan = state_machine::plan(session, SessionEvent::End)?;
            plan.apply(session);
            session.credentials = None;
            session.buzzer_enabled = false;
            session.timer_deadline = None;
            Ok(())
        })
        .await?;

    set_match_status(state, match_id, MatchStatus::Finished).await?;

    info!(%match_id, version = session.version, "session ended");
    Ok(SessionView::from(&session))
}

/// Wipe transient state: disqualifications, buzzer, timer and decisions.
///
/// Scores are untouched; the current question stays selected but hidden, behind a
/// fresh buzzer epoch.
pub async fn reset_session_state(
    state: &SharedState,
    match_id: Uuid,
) -> Result<SessionView, ServiceError> {
    let store = state.require_store().await?;
    let session = state.session(match_id).await?;

    store.clear_disqualifications(match_id).await?;
    for player in store.list_players(match_id).await? {
        sse_events::broadcast_player(state, &player);
    }

    if let Some(question_id) = session.current_question {
        insert_reset(state, &store, match_id, question_id).await?;
    }

    let (session, ()) = state
        .mutate_session(match_id, |session| {
            let plan = state_machine::plan(session, SessionEvent::Reset)?;
            plan.apply(session);
            session.buzzer_enabled = false;
            session.timer_deadline = None;
            session.decided_players.clear();
            session.awarded_ranks = 0;
            Ok(())
        })
        .await?;

    info!(%match_id, version = session.version, "session state reset");
    Ok(SessionView::from(&session))
}

/// Moderator view: session, join code, current question with answer, seats and catalog.
pub async fn snapshot(state: &SharedState, match_id: Uuid) -> Result<SnapshotResponse, ServiceError> {
    let store = state.require_store().await?;
    let session = state.session(match_id).await?;
    let catalog = state.catalog(match_id).await?;
    let players = store.list_players(match_id).await?;

    let current_question = session
        .current_question
        .and_then(|id| catalog.get(id))
        .map(|entry| QuestionView::from_entry(entry, true));
    let join_code = match session.status {
        SessionStatus::Running => session
            .credentials
            .as_ref()
            .map(|credentials| credentials.join_code.clone()),
        _ => None,
    };

    Ok(SnapshotResponse {
        session: SessionView::from(&session),
        join_code,
        current_question,
        players: players.iter().map(PlayerView::from).collect(),
        questions: catalog
            .entries()
            .iter()
            .map(|entry| QuestionSummary::from(&entry.question))
            .collect(),
    })
}

async fn set_match_status(
    state: &SharedState,
    match_id: Uuid,
    status: MatchStatus,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    if let Some(mut entity) = store.find_match(match_id).await?
        && entity.status != status
    {
        entity.status = status;
        entity.updated_at = now_ms();
        store.save_match(entity).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{live_store::LiveStore, models::QuestionState},
        services::{
            access::{ViewerRole, authenticate_viewer},
            test_support::{Fixture, seat},
        },
    };

    #[tokio::test]
    async fn reopening_rotates_credentials() {
        let fixture = Fixture::registered().await;
        let first = open_session(&fixture.state, fixture.match_id).await.unwrap();
        assert_eq!(first.session.status, SessionStatus::Running);

        let role = authenticate_viewer(
            &fixture.state,
            fixture.match_id,
            &first.join_code,
            &first.observer_password,
        )
        .await
        .unwrap();
        assert_eq!(role, ViewerRole::Observer);

        end_session(&fixture.state, fixture.match_id).await.unwrap();
        let second = open_session(&fixture.state, fixture.match_id).await.unwrap();

        let stale = authenticate_viewer(
            &fixture.state,
            fixture.match_id,
            &second.join_code,
            &first.contestant_password,
        )
        .await;
        assert!(matches!(stale, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn ending_twice_is_an_invalid_transition() {
        let fixture = Fixture::running().await;
        end_session(&fixture.state, fixture.match_id).await.unwrap();
        let err = end_session(&fixture.state, fixture.match_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn reset_clears_disqualification_and_hides() {
        let fixture = Fixture::running().await;
        let player = seat(&fixture, 1);
        fixture
            .store
            .set_player_disqualified(fixture.match_id, player, true)
            .await
            .unwrap();

        let view = reset_session_state(&fixture.state, fixture.match_id)
            .await
            .unwrap();
        assert_eq!(view.question_state, QuestionState::Hidden);
        assert!(!view.buzzer_enabled);

        let players = fixture.store.list_players(fixture.match_id).await.unwrap();
        assert!(players.iter().all(|p| !p.is_disqualified_obstacle));
    }

    #[tokio::test]
    async fn snapshot_exposes_join_code_while_running() {
        let fixture = Fixture::running().await;
        let snapshot = snapshot(&fixture.state, fixture.match_id).await.unwrap();
        assert!(snapshot.join_code.is_some());
        assert_eq!(snapshot.players.len(), 4);
        assert!(!snapshot.questions.is_empty());
    }
}
