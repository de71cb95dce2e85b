//! Read-only projection served to guest displays and contestant screens.

use uuid::Uuid;

use crate::{
    dao::models::QuestionState,
    dto::{
        common::{QuestionView, SessionView},
        public::{ObstacleClueView, PublicStateResponse},
    },
    error::ServiceError,
    services::scoring_service,
    state::SharedState,
};

/// Current session, question, scoreboard and obstacle board of a match.
///
/// The question answer only appears once it has been revealed or decided; obstacle
/// clue answers only once the clue is resolved.
pub async fn public_state(
    state: &SharedState,
    match_id: Uuid,
) -> Result<PublicStateResponse, ServiceError> {
    let session = state.session(match_id).await?;
    let catalog = state.catalog(match_id).await?;

    let reveal = matches!(
        session.question_state,
        QuestionState::AnswerRevealed | QuestionState::Completed
    );
    let current_question = session
        .current_question
        .and_then(|question_id| catalog.get(question_id))
        .map(|entry| QuestionView::from_entry(entry, reveal));

    let obstacle_board = catalog
        .obstacle_clues()
        .into_iter()
        .map(|entry| {
            let resolved = entry.is_resolved();
            ObstacleClueView {
                code: entry.code.to_string(),
                resolved,
                answer: resolved.then(|| entry.question.answer.clone()),
            }
        })
        .collect();

    Ok(PublicStateResponse {
        session: SessionView::from(&session),
        current_question,
        scoreboard: scoring_service::scoreboard(state, match_id).await?,
        obstacle_board,
        degraded: state.is_degraded().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        navigation_service,
        test_support::Fixture,
    };

    #[tokio::test]
    async fn answer_stays_hidden_until_revealed() {
        let fixture = Fixture::running().await;
        let question_id = fixture.question_id("DKA-1").await;
        navigation_service::select_question(&fixture.state, fixture.match_id, question_id, true)
            .await
            .unwrap();

        let view = public_state(&fixture.state, fixture.match_id).await.unwrap();
        let question = view.current_question.unwrap();
        assert_eq!(question.id, question_id);
        assert!(question.answer.is_none());
        assert_eq!(view.scoreboard.len(), 4);
        assert!(!view.degraded);
    }

    #[tokio::test]
    async fn obstacle_board_lists_unresolved_clues_without_answers() {
        let fixture = Fixture::running().await;
        let view = public_state(&fixture.state, fixture.match_id).await.unwrap();

        let codes: Vec<_> = view
            .obstacle_board
            .iter()
            .map(|clue| clue.code.as_str())
            .collect();
        assert_eq!(codes, ["VCNV-1", "VCNV-2", "VCNV-3", "VCNV-4"]);
        assert!(view
            .obstacle_board
            .iter()
            .all(|clue| !clue.resolved && clue.answer.is_none()));
    }
}
