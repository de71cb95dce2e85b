//! Match registration and question-bank import.

use std::collections::BTreeMap;

use indexmap::{IndexMap, map::Entry};
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{
        MatchEntity, MatchStatus, PlayerEntity, PoolItemEntity, QuestionEntity, RoundKind,
        SessionEntity, SessionStatus,
    },
    dto::{
        common::PlayerView,
        moderator::{ImportQuestionsRequest, ImportSummary, MatchResponse, QuestionRow, RegisterMatchRequest},
    },
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState,
        catalog::{FINISH_SLOTS, QuestionCode},
        now_ms,
    },
};

/// Create a match, its seats and a pending session.
pub async fn register_match(
    state: &SharedState,
    request: RegisterMatchRequest,
) -> Result<MatchResponse, ServiceError> {
    let store = state.require_store().await?;
    let now = now_ms();

    let entity = MatchEntity {
        id: Uuid::new_v4(),
        name: request.name.trim().to_string(),
        status: MatchStatus::Scheduled,
        created_at: now,
        updated_at: now,
    };

    let mut players: Vec<PlayerEntity> = request
        .players
        .into_iter()
        .map(|player| PlayerEntity {
            id: Uuid::new_v4(),
            match_id: entity.id,
            seat: player.seat,
            display_name: player.display_name.trim().to_string(),
            is_disqualified_obstacle: false,
        })
        .collect();
    players.sort_by_key(|player| player.seat);

    store.save_match(entity.clone()).await?;
    store.save_players(entity.id, players.clone()).await?;
    store
        .insert_session(SessionEntity::pending(entity.id, now))
        .await?;

    info!(match_id = %entity.id, players = players.len(), "match registered");
    Ok(match_response(entity, &players))
}

/// Every known match with its seats.
pub async fn list_matches(state: &SharedState) -> Result<Vec<MatchResponse>, ServiceError> {
    let store = state.require_store().await?;
    let mut matches = store.list_matches().await?;
    matches.sort_by_key(|entity| entity.created_at);

    let mut responses = Vec::with_capacity(matches.len());
    for entity in matches {
        let players = store.list_players(entity.id).await?;
        responses.push(match_response(entity, &players));
    }
    Ok(responses)
}

/// Replace the question set of a match.
///
/// Rows are routed to rounds by their code. `VD-{value}-{n}` rows fill the finish pool
/// and three empty `VD{seat}-{slot}` questions are generated for every seat.
pub async fn import_questions(
    state: &SharedState,
    match_id: Uuid,
    request: ImportQuestionsRequest,
) -> Result<ImportSummary, ServiceError> {
    let store = state.require_store().await?;
    store
        .find_match(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("match {match_id}")))?;

    if let Some(session) = store.find_session(match_id).await?
        && session.status == SessionStatus::Running
    {
        return Err(ServiceError::InvalidState(
            "questions cannot be replaced while the session is running".into(),
        ));
    }

    let rows = parse_rows(request.rows)?;
    let players = store.list_players(match_id).await?;

    let mut questions = Vec::new();
    let mut pool = Vec::new();
    let mut positions: BTreeMap<RoundKind, u32> = BTreeMap::new();

    for (code, row) in rows {
        if let QuestionCode::FinishPool { value, .. } = code {
            pool.push(PoolItemEntity {
                id: Uuid::new_v4(),
                match_id,
                code: code.to_string(),
                value,
                text: row.text.trim().to_string(),
                answer: row.answer.trim().to_string(),
                media_url: row.media_url,
            });
            continue;
        }

        let round = code.round();
        let position = positions.entry(round).or_insert(0);
        *position += 1;
        questions.push(QuestionEntity {
            id: Uuid::new_v4(),
            match_id,
            round,
            position: *position,
            code: code.to_string(),
            text: row.text.trim().to_string(),
            answer: row.answer.trim().to_string(),
            media_url: row.media_url,
            target_player: None,
            value: None,
            meta: BTreeMap::new(),
        });
    }

    let mut finish_slots = 0;
    for player in &players {
        for slot in 1..=FINISH_SLOTS {
            let code = QuestionCode::FinishSlot {
                seat: player.seat,
                slot,
            };
            questions.push(QuestionEntity {
                id: Uuid::new_v4(),
                match_id,
                round: RoundKind::Finish,
                position: u32::from(player.seat - 1) * u32::from(FINISH_SLOTS) + u32::from(slot),
                code: code.to_string(),
                text: String::new(),
                answer: String::new(),
                media_url: None,
                target_player: Some(player.id),
                value: None,
                meta: BTreeMap::new(),
            });
            finish_slots += 1;
        }
    }

    for reservation in store.list_reservations(match_id).await? {
        store
            .release_pool_item(match_id, reservation.pool_item_id)
            .await?;
    }

    let summary = ImportSummary {
        questions: questions.len() - finish_slots,
        pool_items: pool.len(),
        finish_slots,
    };

    store
        .replace_questions(match_id, questions.clone(), pool)
        .await?;
    state.invalidate_catalog(match_id);
    for question in &questions {
        sse_events::broadcast_question(state, question);
    }

    info!(
        %match_id,
        questions = summary.questions,
        pool_items = summary.pool_items,
        finish_slots = summary.finish_slots,
        "question set imported"
    );
    Ok(summary)
}

/// Parse every code once, keeping import order and rejecting duplicates and slot rows.
fn parse_rows(rows: Vec<QuestionRow>) -> Result<IndexMap<QuestionCode, QuestionRow>, ServiceError> {
    let mut parsed = IndexMap::with_capacity(rows.len());

    for (index, row) in rows.into_iter().enumerate() {
        let line = index + 1;
        let code: QuestionCode = row
            .code
            .parse()
            .map_err(|err| ServiceError::InvalidInput(format!("row {line}: {err}")))?;

        match code {
            QuestionCode::FinishSlot { .. } => {
                return Err(ServiceError::InvalidInput(format!(
                    "row {line}: finish slots are generated per seat, import `VD-20-n`/`VD-30-n` pool rows instead"
                )));
            }
            QuestionCode::FinishPool { value, .. } => {
                if let Some(explicit) = row.value
                    && explicit != value
                {
                    return Err(ServiceError::InvalidInput(format!(
                        "row {line}: value {explicit} does not match code {code}"
                    )));
                }
            }
            _ => {}
        }

        match parsed.entry(code) {
            Entry::Occupied(_) => {
                return Err(ServiceError::InvalidInput(format!(
                    "row {line}: duplicate code {code}"
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
        }
    }

    Ok(parsed)
}

fn match_response(entity: MatchEntity, players: &[PlayerEntity]) -> MatchResponse {
    MatchResponse {
        id: entity.id,
        name: entity.name,
        status: entity.status,
        players: players.iter().map(PlayerView::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{Fixture, row};

    #[tokio::test]
    async fn import_routes_rows_and_generates_slots() {
        let fixture = Fixture::registered().await;
        let summary = import_questions(
            &fixture.state,
            fixture.match_id,
            ImportQuestionsRequest {
                rows: vec![
                    row("KD1-1", "q", "a"),
                    row("dka-1", "q", "a"),
                    row("VCNV-1", "q", "a"),
                    row("CNV", "q", "a"),
                    row("TT1", "q", "a"),
                    row("VD-20-1", "q", "a"),
                    row("VD-30-1", "q", "a"),
                ],
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.questions, 5);
        assert_eq!(summary.pool_items, 2);
        assert_eq!(summary.finish_slots, 12);

        let catalog = fixture.state.catalog(fixture.match_id).await.unwrap();
        assert_eq!(catalog.finish_slots(2).len(), 3);
        assert_eq!(catalog.round(RoundKind::Opening).count(), 2);
        assert!(catalog.entries().iter().any(|entry| entry.question.code == "TT-1"));
    }

    #[tokio::test]
    async fn import_rejects_bad_rows() {
        let fixture = Fixture::registered().await;

        for rows in [
            vec![row("XX-1", "q", "a")],
            vec![row("VD1-1", "q", "a")],
            vec![row("KD1-1", "q", "a"), row("kd1-1", "q", "a")],
        ] {
            let err = import_questions(
                &fixture.state,
                fixture.match_id,
                ImportQuestionsRequest { rows },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn import_is_refused_while_running() {
        let fixture = Fixture::running().await;
        let err = import_questions(
            &fixture.state,
            fixture.match_id,
            ImportQuestionsRequest {
                rows: vec![row("KD1-1", "q", "a")],
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }
}
