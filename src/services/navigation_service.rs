//! Question navigation, targeting and timers.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    config::TimerRules,
    dao::{
        live_store::LiveStore,
        models::{QuestionState, RoundKind, SessionEntity},
    },
    dto::{
        common::{QuestionView, SessionView},
        moderator::{AdvanceResponse, TimerResponse},
    },
    error::ServiceError,
    services::live::{self, insert_reset, persist_question, player_at_seat, running_session},
    state::{
        SharedState,
        catalog::{CatalogEntry, Direction, META_RESOLVED, QuestionCode},
        now_ms,
        state_machine::{self, SessionEvent},
    },
};

/// Make `round` current with no question selected.
pub async fn select_round(
    state: &SharedState,
    match_id: Uuid,
    round: RoundKind,
) -> Result<SessionView, ServiceError> {
    running_session(state, match_id).await?;

    let (session, ()) = state
        .mutate_session(match_id, |session| {
            let plan = state_machine::plan(session, SessionEvent::EnterRound)?;
            plan.apply(session);
            session.current_round = Some(round);
            session.current_question = None;
            clear_question_transients(session);
            Ok(())
        })
        .await?;

    info!(%match_id, round = round.as_str(), "round selected");
    Ok(SessionView::from(&session))
}

/// Land on a question, optionally putting it on screen.
pub async fn select_question(
    state: &SharedState,
    match_id: Uuid,
    question_id: Uuid,
    auto_show: bool,
) -> Result<QuestionView, ServiceError> {
    let (store, _) = running_session(state, match_id).await?;
    let catalog = state.catalog(match_id).await?;
    let entry = catalog
        .get(question_id)
        .cloned()
        .ok_or_else(|| ServiceError::NotFound(format!("question {question_id}")))?;

    let landed = land(state, &store, match_id, entry, auto_show).await?;
    Ok(QuestionView::from_entry(&landed, true))
}

/// Move to the neighbouring question of the current round.
///
/// Leaving a seat's personal opening questions always stops hidden, whatever `auto_show`
/// says, so the next contestant can get ready.
pub async fn advance(
    state: &SharedState,
    match_id: Uuid,
    direction: Direction,
    auto_show: bool,
) -> Result<AdvanceResponse, ServiceError> {
    let (store, session) = running_session(state, match_id).await?;
    let catalog = state.catalog(match_id).await?;

    let (current, target) = match session.current_question {
        Some(current_id) => {
            let current = catalog
                .get(current_id)
                .ok_or_else(|| ServiceError::NotFound(format!("question {current_id}")))?;
            let target = catalog.neighbour(current_id, direction).ok_or_else(|| {
                ServiceError::InvalidState("no further question in this round".into())
            })?;
            (Some(current), target)
        }
        None => {
            let round = session
                .current_round
                .ok_or_else(|| ServiceError::InvalidState("no round selected".into()))?;
            let first = match direction {
                Direction::Next => catalog.round(round).next(),
                Direction::Previous => catalog.round(round).last(),
            };
            let target = first.ok_or_else(|| {
                ServiceError::InvalidState("round has no questions".into())
            })?;
            (None, target)
        }
    };

    let seat_boundary = match current {
        Some(current) => crosses_seat_boundary(&current.code, &target.code),
        None => matches!(target.code, QuestionCode::OpeningPersonal { .. }),
    };
    let show = auto_show && !seat_boundary;

    let landed = land(state, &store, match_id, target.clone(), show).await?;
    Ok(AdvanceResponse {
        question: QuestionView::from_entry(&landed, true),
        auto_shown: show,
        seat_boundary,
    })
}

/// Put the current question (back) on screen, opening a fresh buzzer epoch.
pub async fn show_question(
    state: &SharedState,
    match_id: Uuid,
) -> Result<SessionView, ServiceError> {
    let live = live::live_question(state, match_id).await?;
    let question_id = live.entry.question.id;

    clear_common_target(state, &live.store, &live.entry).await?;
    insert_reset(state, &live.store, match_id, question_id).await?;

    let (session, ()) = state
        .mutate_session(match_id, |session| {
            ensure_current(session, question_id)?;
            let plan = state_machine::plan(session, SessionEvent::Show)?;
            plan.apply(session);
            session.timer_deadline = None;
            Ok(())
        })
        .await?;

    info!(%match_id, %question_id, "question shown");
    Ok(SessionView::from(&session))
}

/// Take the current question off screen.
pub async fn hide_question(
    state: &SharedState,
    match_id: Uuid,
) -> Result<SessionView, ServiceError> {
    running_session(state, match_id).await?;

    let (session, ()) = state
        .mutate_session(match_id, |session| {
            let plan = state_machine::plan(session, SessionEvent::Hide)?;
            plan.apply(session);
            session.timer_deadline = None;
            Ok(())
        })
        .await?;

    Ok(SessionView::from(&session))
}

/// Lock a question to a player, or clear the lock with `None`.
pub async fn set_target(
    state: &SharedState,
    match_id: Uuid,
    question_id: Uuid,
    player_id: Option<Uuid>,
) -> Result<QuestionView, ServiceError> {
    let store = state.require_store().await?;
    let catalog = state.catalog(match_id).await?;
    let mut entry = catalog
        .get(question_id)
        .cloned()
        .ok_or_else(|| ServiceError::NotFound(format!("question {question_id}")))?;

    if let Some(player_id) = player_id {
        live::find_player(&store, match_id, player_id).await?;
    }

    entry.question.target_player = player_id;
    persist_question(state, &store, entry.question.clone()).await?;

    info!(%match_id, %question_id, target = ?player_id, "question target set");
    Ok(QuestionView::from_entry(&entry, true))
}

/// Start the answer timer; the duration falls back to the round default.
pub async fn start_timer(
    state: &SharedState,
    match_id: Uuid,
    duration_ms: Option<u64>,
) -> Result<TimerResponse, ServiceError> {
    let live = live::live_question(state, match_id).await?;
    let duration_ms = match duration_ms {
        Some(duration) => duration,
        None => default_duration(
            &state.config().timers,
            &live.entry,
            live.session.question_state,
            live.catalog.index_in_round(live.entry.question.id).unwrap_or(0),
        ),
    };
    let question_id = live.entry.question.id;

    let (session, deadline) = state
        .mutate_session(match_id, |session| {
            ensure_current(session, question_id)?;
            if !matches!(
                session.question_state,
                QuestionState::Showing | QuestionState::AnswerRevealed
            ) {
                return Err(ServiceError::InvalidState(
                    "timer needs the question on screen".into(),
                ));
            }
            let deadline = now_ms().saturating_add(i64::try_from(duration_ms).unwrap_or(i64::MAX));
            session.timer_deadline = Some(deadline);
            Ok(deadline)
        })
        .await?;

    info!(%match_id, %question_id, deadline, version = session.version, "timer started");
    Ok(TimerResponse {
        deadline,
        duration_ms,
    })
}

/// Force the timer to elapse now and close the buzzer.
pub async fn expire_timer(
    state: &SharedState,
    match_id: Uuid,
) -> Result<SessionView, ServiceError> {
    running_session(state, match_id).await?;

    let (session, ()) = state
        .mutate_session(match_id, |session| {
            if session.current_question.is_none() {
                return Err(ServiceError::InvalidState("no active question".into()));
            }
            session.timer_deadline = Some(now_ms());
            session.buzzer_enabled = false;
            Ok(())
        })
        .await?;

    info!(%match_id, "timer expired");
    Ok(SessionView::from(&session))
}

/// Open an obstacle sub-clue on the board without scoring it.
pub async fn resolve_obstacle_clue(
    state: &SharedState,
    match_id: Uuid,
    question_id: Uuid,
) -> Result<QuestionView, ServiceError> {
    let store = state.require_store().await?;
    let catalog = state.catalog(match_id).await?;
    let mut entry = catalog
        .get(question_id)
        .cloned()
        .ok_or_else(|| ServiceError::NotFound(format!("question {question_id}")))?;

    if !matches!(entry.code, QuestionCode::ObstacleClue { .. }) {
        return Err(ServiceError::InvalidInput(
            "only obstacle sub-clues can be resolved".into(),
        ));
    }

    entry
        .question
        .meta
        .insert(META_RESOLVED.into(), Value::Bool(true));
    persist_question(state, &store, entry.question.clone()).await?;

    info!(%match_id, %question_id, "obstacle clue resolved");
    Ok(QuestionView::from_entry(&entry, true))
}

/// Shared landing path of select and advance: new epoch, target reset, session move.
async fn land(
    state: &SharedState,
    store: &Arc<dyn LiveStore>,
    match_id: Uuid,
    mut entry: CatalogEntry,
    show: bool,
) -> Result<CatalogEntry, ServiceError> {
    let question_id = entry.question.id;

    if entry.code.is_common() {
        if entry.question.target_player.take().is_some() {
            persist_question(state, store, entry.question.clone()).await?;
        }
    } else if let Some(seat) = entry.code.seat()
        && entry.question.target_player.is_none()
        && let Some(player) = player_at_seat(store, match_id, seat).await?
    {
        entry.question.target_player = Some(player.id);
        persist_question(state, store, entry.question.clone()).await?;
    }

    insert_reset(state, store, match_id, question_id).await?;

    let round = entry.question.round;
    state
        .mutate_session(match_id, |session| {
            let plan = state_machine::plan(session, SessionEvent::Land { show })?;
            plan.apply(session);
            session.current_round = Some(round);
            session.current_question = Some(question_id);
            clear_question_transients(session);
            Ok(())
        })
        .await?;

    info!(%match_id, %question_id, code = %entry.code, show, "question selected");
    Ok(entry)
}

async fn clear_common_target(
    state: &SharedState,
    store: &Arc<dyn LiveStore>,
    entry: &CatalogEntry,
) -> Result<(), ServiceError> {
    if entry.code.is_common() && entry.question.target_player.is_some() {
        let mut question = entry.question.clone();
        question.target_player = None;
        persist_question(state, store, question).await?;
    }
    Ok(())
}

fn ensure_current(session: &SessionEntity, question_id: Uuid) -> Result<(), ServiceError> {
    if session.current_question != Some(question_id) {
        return Err(ServiceError::InvalidState(
            "current question changed".into(),
        ));
    }
    Ok(())
}

/// Per-question state that never survives a move to another question.
fn clear_question_transients(session: &mut SessionEntity) {
    session.timer_deadline = None;
    session.decided_players.clear();
    session.awarded_ranks = 0;
}

/// Landing on another seat's personal question, or leaving one for the common pool.
fn crosses_seat_boundary(from: &QuestionCode, to: &QuestionCode) -> bool {
    match (from, to) {
        (
            QuestionCode::OpeningPersonal { seat: a, .. },
            QuestionCode::OpeningPersonal { seat: b, .. },
        ) => a != b,
        (_, QuestionCode::OpeningPersonal { .. }) => true,
        (QuestionCode::OpeningPersonal { .. }, QuestionCode::OpeningCommon { .. }) => true,
        _ => false,
    }
}

/// Timer default of the question in its current display state.
fn default_duration(
    timers: &TimerRules,
    entry: &CatalogEntry,
    display: QuestionState,
    index_in_round: usize,
) -> u64 {
    if display == QuestionState::AnswerRevealed {
        return timers.steal_window_ms;
    }

    match entry.question.round {
        RoundKind::Opening => timers.opening_ms,
        RoundKind::Obstacle => timers.obstacle_ms,
        RoundKind::Speed => timers
            .speed_by_position_ms
            .get(index_in_round)
            .copied()
            .unwrap_or(timers.speed_default_ms),
        RoundKind::Finish => match entry.question.value {
            Some(30) => timers.finish_30_ms,
            _ => timers.finish_20_ms,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        dao::models::QuestionEntity,
        services::test_support::{Fixture, seat},
    };

    fn entry(code: &str, round: RoundKind, value: Option<u8>) -> CatalogEntry {
        CatalogEntry {
            question: QuestionEntity {
                id: Uuid::new_v4(),
                match_id: Uuid::nil(),
                round,
                position: 1,
                code: code.into(),
                text: String::new(),
                answer: String::new(),
                media_url: None,
                target_player: None,
                value,
                meta: BTreeMap::new(),
            },
            code: code.parse().unwrap(),
        }
    }

    #[test]
    fn seat_change_and_common_pool_are_boundaries() {
        let kd2: QuestionCode = "KD2-3".parse().unwrap();
        let kd2_next: QuestionCode = "KD2-4".parse().unwrap();
        let kd3: QuestionCode = "KD3-1".parse().unwrap();
        let common: QuestionCode = "DKA-1".parse().unwrap();

        assert!(!crosses_seat_boundary(&kd2, &kd2_next));
        assert!(crosses_seat_boundary(&kd2, &kd3));
        assert!(crosses_seat_boundary(&kd2, &common));
        assert!(crosses_seat_boundary(&common, &kd3));
        assert!(!crosses_seat_boundary(&common, &"DKA-2".parse().unwrap()));
    }

    async fn land_on(fixture: &Fixture, code: &str) {
        let question_id = fixture.question_id(code).await;
        select_question(&fixture.state, fixture.match_id, question_id, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn advancing_within_a_seat_keeps_auto_show() {
        let fixture = Fixture::running().await;
        land_on(&fixture, "KD2-1").await;

        let moved = advance(&fixture.state, fixture.match_id, Direction::Next, true)
            .await
            .unwrap();
        assert_eq!(moved.question.code, "KD2-2");
        assert!(moved.auto_shown);
        assert!(!moved.seat_boundary);
        let session = fixture.state.session(fixture.match_id).await.unwrap();
        assert_eq!(session.question_state, QuestionState::Showing);
    }

    #[tokio::test]
    async fn next_seat_waits_hidden_despite_auto_show() {
        let fixture = Fixture::running().await;
        land_on(&fixture, "KD2-2").await;

        let moved = advance(&fixture.state, fixture.match_id, Direction::Next, true)
            .await
            .unwrap();
        assert_eq!(moved.question.code, "KD3-1");
        assert!(!moved.auto_shown);
        assert!(moved.seat_boundary);

        let session = fixture.state.session(fixture.match_id).await.unwrap();
        assert_eq!(session.question_state, QuestionState::Hidden);
        assert_eq!(session.current_question, Some(moved.question.id));
        assert_eq!(moved.question.target_player, Some(seat(&fixture, 3)));
    }

    #[tokio::test]
    async fn stepping_back_from_the_common_pool_does_not_reveal_a_seat() {
        let fixture = Fixture::running().await;
        land_on(&fixture, "DKA-1").await;

        let moved = advance(&fixture.state, fixture.match_id, Direction::Previous, true)
            .await
            .unwrap();
        assert_eq!(moved.question.code, "KD4-1");
        assert!(!moved.auto_shown);

        let session = fixture.state.session(fixture.match_id).await.unwrap();
        assert_eq!(session.question_state, QuestionState::Hidden);
    }

    #[test]
    fn default_duration_by_round() {
        let timers = TimerRules::default();

        assert_eq!(
            default_duration(&timers, &entry("KD1-1", RoundKind::Opening, None), QuestionState::Showing, 0),
            5_000
        );
        assert_eq!(
            default_duration(&timers, &entry("TT-2", RoundKind::Speed, None), QuestionState::Showing, 1),
            20_000
        );
        assert_eq!(
            default_duration(&timers, &entry("TT-9", RoundKind::Speed, None), QuestionState::Showing, 8),
            30_000
        );
        assert_eq!(
            default_duration(&timers, &entry("VD1-1", RoundKind::Finish, Some(30)), QuestionState::Showing, 0),
            20_000
        );
        assert_eq!(
            default_duration(
                &timers,
                &entry("VD1-1", RoundKind::Finish, Some(30)),
                QuestionState::AnswerRevealed,
                0
            ),
            3_000
        );
    }
}
