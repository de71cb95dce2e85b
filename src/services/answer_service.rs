//! Answer intake with round-specific eligibility and timing gates.

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::models::{AnswerEntity, BuzzKind, QuestionState, RoundKind},
    dto::{moderator::AnswerView, play::SubmitAnswerResponse, sse::ChangeKind},
    error::ServiceError,
    scoring::grading,
    services::{buzzer_service::epoch_winner, live, sse_events},
    state::{SharedState, epoch::latest_reset, now_ms},
};

const NOT_YOUR_TURN: &str = "already someone else's turn";

/// Accept a contestant submission for the current question.
pub async fn submit(
    state: &SharedState,
    match_id: Uuid,
    player_id: Uuid,
    text: &str,
) -> Result<SubmitAnswerResponse, ServiceError> {
    let live = live::live_question(state, match_id).await?;
    let session = &live.session;
    let question = &live.entry.question;
    let now = now_ms();

    let reject = |reason: &str| {
        debug!(%match_id, %player_id, question_id = %question.id, reason, "answer rejected");
        ServiceError::InvalidState(reason.to_string())
    };

    let steal_window = question.round == RoundKind::Finish
        && session.question_state == QuestionState::AnswerRevealed;
    if session.question_state != QuestionState::Showing && !steal_window {
        return Err(reject("answers are closed"));
    }
    if session.timer_deadline.is_some_and(|deadline| now > deadline) {
        return Err(reject("time's up"));
    }

    let player = live::find_player(&live.store, match_id, player_id).await?;
    if player.is_disqualified_obstacle && session.current_round == Some(RoundKind::Obstacle) {
        return Err(reject("you are out of this round"));
    }

    let events = live.store.list_buzzer_events(question.id).await?;
    let reset = latest_reset(&events).cloned();

    if steal_window {
        if question.target_player == Some(player_id) {
            return Err(reject(NOT_YOUR_TURN));
        }
        let stole = epoch_winner(&live.store, question.id)
            .await?
            .is_some_and(|winner| {
                winner.event_type == BuzzKind::Steal && winner.player_id == Some(player_id)
            });
        if !stole {
            return Err(reject(NOT_YOUR_TURN));
        }
        let epoch_id = reset.as_ref().map(|reset| reset.id);
        let already_answered = live
            .store
            .list_answers(question.id)
            .await?
            .iter()
            .any(|answer| answer.player_id == player_id && answer.epoch_id == epoch_id);
        if already_answered {
            return Err(reject("only one steal answer is allowed"));
        }
    } else if question
        .target_player
        .is_some_and(|target| target != player_id)
    {
        return Err(reject(NOT_YOUR_TURN));
    }

    let is_correct = (question.round == RoundKind::Speed)
        .then(|| grading::is_match(text, &question.answer));

    let answer = AnswerEntity {
        id: Uuid::new_v4(),
        match_id,
        question_id: question.id,
        player_id,
        text: text.trim().to_string(),
        submitted_at: now,
        response_time_ms: reset.as_ref().map(|reset| (now - reset.occurred_at).max(0)),
        epoch_id: reset.as_ref().map(|reset| reset.id),
        is_correct,
        points_awarded: None,
    };
    live.store.insert_answer(answer.clone()).await?;
    sse_events::broadcast_answer(state, &answer, ChangeKind::Created);

    info!(
        %match_id,
        %player_id,
        question_id = %question.id,
        response_time_ms = ?answer.response_time_ms,
        auto_graded = ?is_correct,
        "answer submitted"
    );
    Ok(SubmitAnswerResponse {
        answer_id: answer.id,
        response_time_ms: answer.response_time_ms,
    })
}

/// Submissions of a question in submission order, for moderator review.
pub async fn list_answers(
    state: &SharedState,
    match_id: Uuid,
    question_id: Uuid,
) -> Result<Vec<AnswerView>, ServiceError> {
    let store = state.require_store().await?;
    let catalog = state.catalog(match_id).await?;
    if catalog.get(question_id).is_none() {
        return Err(ServiceError::NotFound(format!("question {question_id}")));
    }

    Ok(store
        .list_answers(question_id)
        .await?
        .into_iter()
        .map(|answer| AnswerView {
            id: answer.id,
            player_id: answer.player_id,
            text: answer.text,
            submitted_at: answer.submitted_at,
            response_time_ms: answer.response_time_ms,
            is_correct: answer.is_correct,
            points_awarded: answer.points_awarded,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::services::{
        navigation_service,
        test_support::{Fixture, seat},
    };

    #[tokio::test]
    async fn speed_round_answers_are_auto_graded() {
        let fixture = Fixture::running().await;
        let question_id = fixture.question_id("TT-1").await;
        navigation_service::select_question(&fixture.state, fixture.match_id, question_id, true)
            .await
            .unwrap();

        let right = seat(&fixture, 1);
        let wrong = seat(&fixture, 2);
        let ack = submit(&fixture.state, fixture.match_id, right, "  hà  nội ")
            .await
            .unwrap();
        assert!(ack.response_time_ms.is_some_and(|ms| ms >= 0));
        submit(&fixture.state, fixture.match_id, wrong, "Hai Phong")
            .await
            .unwrap();

        let answers = list_answers(&fixture.state, fixture.match_id, question_id)
            .await
            .unwrap();
        let graded: Vec<_> = answers
            .iter()
            .map(|answer| (answer.player_id, answer.is_correct))
            .collect();
        assert_eq!(graded, vec![(right, Some(true)), (wrong, Some(false))]);
    }

    #[tokio::test]
    async fn personal_question_only_accepts_the_target() {
        let fixture = Fixture::running().await;
        let question_id = fixture.question_id("KD2-1").await;
        navigation_service::select_question(&fixture.state, fixture.match_id, question_id, true)
            .await
            .unwrap();

        let err = submit(&fixture.state, fixture.match_id, seat(&fixture, 1), "three")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(reason) if reason == NOT_YOUR_TURN));

        submit(&fixture.state, fixture.match_id, seat(&fixture, 2), "three")
            .await
            .unwrap();
        let answers = list_answers(&fixture.state, fixture.match_id, question_id)
            .await
            .unwrap();
        assert_eq!(answers[0].is_correct, None);
    }

    #[tokio::test]
    async fn answers_after_the_deadline_are_refused() {
        let fixture = Fixture::running().await;
        let question_id = fixture.question_id("TT-2").await;
        navigation_service::select_question(&fixture.state, fixture.match_id, question_id, true)
            .await
            .unwrap();
        navigation_service::start_timer(&fixture.state, fixture.match_id, Some(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = submit(&fixture.state, fixture.match_id, seat(&fixture, 1), "nine")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(reason) if reason == "time's up"));
    }

    #[tokio::test]
    async fn hidden_question_takes_no_answers() {
        let fixture = Fixture::running().await;
        let question_id = fixture.question_id("TT-3").await;
        navigation_service::select_question(&fixture.state, fixture.match_id, question_id, false)
            .await
            .unwrap();

        let err = submit(&fixture.state, fixture.match_id, seat(&fixture, 3), "ten")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }
}
