//! Buzzer adjudication: first signal of the current epoch wins.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{
        live_store::LiveStore,
        models::{BuzzKind, BuzzResult, BuzzerEventEntity, QuestionState, RoundKind},
    },
    dto::{
        common::BuzzerEventView,
        moderator::BuzzerStateResponse,
        play::{SignalKind, SignalResponse},
    },
    error::ServiceError,
    services::{
        live::{self, persist_question, running_session},
        sse_events,
    },
    state::{
        SharedState,
        epoch::{epoch_key, events_in_epoch, latest_reset, resolve_winner},
        now_ms,
    },
};

const NOT_OPEN: &str = "buzzer is closed";
const NOT_YOUR_TURN: &str = "already someone else's turn";

/// Adjudicate a contestant signal against the current epoch of the active question.
pub async fn signal(
    state: &SharedState,
    match_id: Uuid,
    player_id: Uuid,
    kind: SignalKind,
) -> Result<SignalResponse, ServiceError> {
    let event_type = match kind {
        SignalKind::Buzz => BuzzKind::Buzz,
        SignalKind::Steal => BuzzKind::Steal,
        SignalKind::Trial => {
            running_session(state, match_id).await?;
            sse_events::broadcast_trial(state, match_id, player_id);
            debug!(%match_id, %player_id, "buzzer trial");
            return Ok(SignalResponse { won: false });
        }
    };

    let live = live::live_question(state, match_id).await?;
    let session = &live.session;
    let question = &live.entry.question;

    let reject = |reason: &str| {
        debug!(%match_id, %player_id, question_id = %question.id, reason, "signal rejected");
        ServiceError::InvalidState(reason.to_string())
    };

    if !session.buzzer_enabled {
        return Err(reject(NOT_OPEN));
    }

    let window_open = match event_type {
        BuzzKind::Steal => {
            question.round == RoundKind::Finish
                && session.question_state == QuestionState::AnswerRevealed
        }
        _ => session.question_state == QuestionState::Showing,
    };
    if !window_open {
        return Err(reject(NOT_OPEN));
    }

    let player = live::find_player(&live.store, match_id, player_id).await?;
    if player.is_disqualified_obstacle && session.current_round == Some(RoundKind::Obstacle) {
        return Err(reject("you are out of this round"));
    }

    let events = live.store.list_buzzer_events(question.id).await?;
    let reset = latest_reset(&events)
        .cloned()
        .ok_or_else(|| ServiceError::InvalidState("question has not been displayed".into()))?;
    let winner = resolve_winner(&events).and_then(|event| event.player_id);

    // A lock taken by this epoch's race still records late buzzes as losses.
    match (event_type, question.target_player) {
        (BuzzKind::Buzz, Some(target)) if target != player_id && winner != Some(target) => {
            return Err(reject(NOT_YOUR_TURN));
        }
        (BuzzKind::Steal, Some(target)) if target == player_id => {
            return Err(reject("you cannot steal your own question"));
        }
        _ => {}
    }

    let event_id = Uuid::new_v4();
    let won = winner.is_none()
        && live
            .store
            .claim_buzzer_win(epoch_key(question.id, reset.id), event_id)
            .await?;

    let event = BuzzerEventEntity {
        id: event_id,
        match_id,
        question_id: question.id,
        player_id: Some(player_id),
        event_type,
        result: Some(if won { BuzzResult::Win } else { BuzzResult::Lose }),
        epoch_id: Some(reset.id),
        occurred_at: now_ms().max(reset.occurred_at),
    };
    live.store.append_buzzer_event(event.clone()).await?;
    sse_events::broadcast_buzzer_event(state, &event);

    if won && event_type == BuzzKind::Buzz && live.entry.code.locks_on_buzz() {
        let mut locked = question.clone();
        locked.target_player = Some(player_id);
        persist_question(state, &live.store, locked).await?;
    }

    info!(
        %match_id,
        %player_id,
        question_id = %question.id,
        kind = ?event_type,
        won,
        "buzzer signal adjudicated"
    );
    Ok(SignalResponse { won })
}

/// Epoch-filtered log of a question, so clients can predict the winner the same way.
pub async fn buzzer_state(
    state: &SharedState,
    match_id: Uuid,
    question_id: Uuid,
) -> Result<BuzzerStateResponse, ServiceError> {
    let store = state.require_store().await?;
    let catalog = state.catalog(match_id).await?;
    if catalog.get(question_id).is_none() {
        return Err(ServiceError::NotFound(format!("question {question_id}")));
    }

    let events = store.list_buzzer_events(question_id).await?;
    let Some(reset) = latest_reset(&events) else {
        return Ok(BuzzerStateResponse {
            question_id,
            reset: None,
            events: Vec::new(),
            winner: None,
        });
    };

    let epoch = events_in_epoch(&events, reset);
    let winner = resolve_winner(&events).map(BuzzerEventView::from);

    Ok(BuzzerStateResponse {
        question_id,
        reset: Some(BuzzerEventView::from(reset)),
        events: epoch.into_iter().map(BuzzerEventView::from).collect(),
        winner,
    })
}

/// Winning signal of the current epoch of a question.
pub(crate) async fn epoch_winner(
    store: &Arc<dyn LiveStore>,
    question_id: Uuid,
) -> Result<Option<BuzzerEventEntity>, ServiceError> {
    let events = store.list_buzzer_events(question_id).await?;
    Ok(resolve_winner(&events).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{Fixture, seat};
    use crate::services::{navigation_service, presentation_service};

    async fn showing_common(fixture: &Fixture) -> Uuid {
        let question_id = fixture.question_id("DKA-1").await;
        navigation_service::select_question(&fixture.state, fixture.match_id, question_id, true)
            .await
            .unwrap();
        presentation_service::toggle_buzzer(&fixture.state, fixture.match_id, true)
            .await
            .unwrap();
        question_id
    }

    #[tokio::test]
    async fn first_signal_wins_and_locks_common_question() {
        let fixture = Fixture::running().await;
        let question_id = showing_common(&fixture).await;
        let first = seat(&fixture, 1);
        let second = seat(&fixture, 2);

        let a = signal(&fixture.state, fixture.match_id, first, SignalKind::Buzz)
            .await
            .unwrap();
        assert!(a.won);

        let b = signal(&fixture.state, fixture.match_id, second, SignalKind::Buzz)
            .await
            .unwrap();
        assert!(!b.won);

        let view = buzzer_state(&fixture.state, fixture.match_id, question_id)
            .await
            .unwrap();
        assert_eq!(view.winner.and_then(|w| w.player_id), Some(first));
        let results: Vec<_> = view
            .events
            .iter()
            .map(|event| (event.player_id, event.result))
            .collect();
        assert_eq!(
            results,
            vec![
                (Some(first), Some(BuzzResult::Win)),
                (Some(second), Some(BuzzResult::Lose)),
            ]
        );
        let catalog = fixture.state.catalog(fixture.match_id).await.unwrap();
        assert_eq!(catalog.get(question_id).unwrap().question.target_player, Some(first));
    }

    #[tokio::test]
    async fn personal_question_turns_other_seats_away() {
        let fixture = Fixture::running().await;
        let question_id = fixture.question_id("KD2-1").await;
        navigation_service::select_question(&fixture.state, fixture.match_id, question_id, true)
            .await
            .unwrap();
        presentation_service::toggle_buzzer(&fixture.state, fixture.match_id, true)
            .await
            .unwrap();

        let err = signal(&fixture.state, fixture.match_id, seat(&fixture, 1), SignalKind::Buzz)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(reason) if reason == NOT_YOUR_TURN));

        let own = signal(&fixture.state, fixture.match_id, seat(&fixture, 2), SignalKind::Buzz)
            .await
            .unwrap();
        assert!(own.won);

        let view = buzzer_state(&fixture.state, fixture.match_id, question_id)
            .await
            .unwrap();
        assert_eq!(view.events.len(), 1);
    }

    #[tokio::test]
    async fn at_most_one_winner_under_concurrent_signals() {
        let fixture = Fixture::running().await;
        let question_id = fixture.question_id("TT-1").await;
        navigation_service::select_question(&fixture.state, fixture.match_id, question_id, true)
            .await
            .unwrap();
        presentation_service::toggle_buzzer(&fixture.state, fixture.match_id, true)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for s in 1..=4 {
            let state = fixture.state.clone();
            let match_id = fixture.match_id;
            let player = seat(&fixture, s);
            handles.push(tokio::spawn(async move {
                signal(&state, match_id, player, SignalKind::Buzz).await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().won {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);

        let view = buzzer_state(&fixture.state, fixture.match_id, question_id)
            .await
            .unwrap();
        let recorded_wins = view
            .events
            .iter()
            .filter(|event| event.result == Some(BuzzResult::Win))
            .count();
        assert_eq!(recorded_wins, 1);
        assert_eq!(view.events.len(), 4);
    }

    #[tokio::test]
    async fn redisplay_opens_a_fresh_epoch() {
        let fixture = Fixture::running().await;
        let question_id = fixture.question_id("TT-1").await;
        navigation_service::select_question(&fixture.state, fixture.match_id, question_id, true)
            .await
            .unwrap();
        presentation_service::toggle_buzzer(&fixture.state, fixture.match_id, true)
            .await
            .unwrap();

        let early = seat(&fixture, 1);
        assert!(signal(&fixture.state, fixture.match_id, early, SignalKind::Buzz)
            .await
            .unwrap()
            .won);

        navigation_service::show_question(&fixture.state, fixture.match_id)
            .await
            .unwrap();

        let view = buzzer_state(&fixture.state, fixture.match_id, question_id)
            .await
            .unwrap();
        assert!(view.events.is_empty());
        assert!(view.winner.is_none());

        let late = seat(&fixture, 2);
        assert!(signal(&fixture.state, fixture.match_id, late, SignalKind::Buzz)
            .await
            .unwrap()
            .won);
    }

    #[tokio::test]
    async fn closed_buzzer_and_trial_signals() {
        let fixture = Fixture::running().await;
        let question_id = fixture.question_id("DKA-1").await;
        navigation_service::select_question(&fixture.state, fixture.match_id, question_id, true)
            .await
            .unwrap();
        let player = seat(&fixture, 1);

        let err = signal(&fixture.state, fixture.match_id, player, SignalKind::Buzz)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(reason) if reason == NOT_OPEN));

        let trial = signal(&fixture.state, fixture.match_id, player, SignalKind::Trial)
            .await
            .unwrap();
        assert!(!trial.won);
        let view = buzzer_state(&fixture.state, fixture.match_id, question_id)
            .await
            .unwrap();
        assert!(view.events.is_empty());
    }
}
