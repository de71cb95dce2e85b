//! Finish-round packages and stars.

use std::{collections::HashSet, sync::Arc};

use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        live_store::LiveStore,
        models::{
            PoolItemEntity, PoolReservationEntity, QuestionState, SessionEntity, StarUseEntity,
        },
    },
    dto::{
        play::{PackageResponse, PackageSlotView, StarResponse},
        sse::ChangeKind,
    },
    error::ServiceError,
    scoring::grading::normalize,
    services::{
        live::{self, persist_question, running_session},
        sse_events,
    },
    state::{
        SharedState,
        catalog::{CatalogEntry, FINISH_SLOTS, META_POOL_ITEM, QuestionCode},
        now_ms,
    },
};

/// Identity of a question's content, shared by duplicate imports of the same text.
pub fn fingerprint(text: &str, answer: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize(answer).as_bytes());
    hex::encode(hasher.finalize())
}

/// Commit a package: one value per slot, each slot drawing an unused pool item.
///
/// Slots whose value is unchanged keep their question. Changed slots draw first, and
/// only once every draw succeeded are the old items released and the slot answers
/// discarded; an exhausted tier rolls the new reservations back.
pub async fn select_package(
    state: &SharedState,
    match_id: Uuid,
    player_id: Uuid,
    values: Vec<u8>,
) -> Result<PackageResponse, ServiceError> {
    if values.len() != usize::from(FINISH_SLOTS) || values.iter().any(|v| !matches!(v, 20 | 30)) {
        return Err(ServiceError::InvalidInput(
            "a package is three values of 20 or 30".into(),
        ));
    }

    let (store, session) = running_session(state, match_id).await?;
    let player = live::find_player(&store, match_id, player_id).await?;
    let catalog = state.catalog(match_id).await?;
    let slots: Vec<CatalogEntry> = catalog
        .finish_slots(player.seat)
        .into_iter()
        .cloned()
        .collect();
    if slots.len() != usize::from(FINISH_SLOTS) {
        return Err(ServiceError::InvalidState(
            "finish slots are missing, import the question set first".into(),
        ));
    }

    let stars = store.list_stars(match_id).await?;
    let mut changes: Vec<(CatalogEntry, u8)> = Vec::new();
    for (slot, value) in slots.iter().zip(values.iter().copied()) {
        if slot.question.value == Some(value) {
            continue;
        }
        let in_play = session.current_question == Some(slot.question.id)
            && matches!(
                session.question_state,
                QuestionState::Showing | QuestionState::AnswerRevealed
            );
        if in_play {
            return Err(ServiceError::InvalidState(
                "the question in play cannot change".into(),
            ));
        }
        let starred = stars
            .iter()
            .any(|star| star.player_id == player_id && star.question_id == slot.question.id);
        if starred {
            return Err(ServiceError::InvalidState(
                "withdraw your star before changing that slot".into(),
            ));
        }
        changes.push((slot.clone(), value));
    }

    if !changes.is_empty() {
        let drawn = draw(&store, match_id, player_id, &changes).await?;

        for ((slot, value), item) in changes.iter().zip(drawn) {
            if let Some(previous) = slot_pool_item(slot) {
                store.release_pool_item(match_id, previous).await?;
            }

            let mut question = slot.question.clone();
            question.text = item.text.clone();
            question.answer = item.answer.clone();
            question.media_url = item.media_url.clone();
            question.value = Some(*value);
            question
                .meta
                .insert(META_POOL_ITEM.into(), Value::String(item.id.to_string()));
            persist_question(state, &store, question).await?;

            let discarded = store.delete_answers(slot.question.id, player_id).await?;
            if discarded > 0 {
                debug!(%match_id, %player_id, question_id = %slot.question.id, discarded, "answers discarded with old slot question");
            }
        }
    }

    let response = PackageResponse {
        slots: slots
            .iter()
            .zip(values.iter().copied())
            .map(|(slot, value)| PackageSlotView {
                question_id: slot.question.id,
                code: slot.code.to_string(),
                value,
            })
            .collect(),
    };

    info!(%match_id, %player_id, ?values, changed = changes.len(), "package selected");
    Ok(response)
}

/// Declare the player's one star on one of their own undecided slots.
pub async fn declare_star(
    state: &SharedState,
    match_id: Uuid,
    player_id: Uuid,
    question_id: Uuid,
) -> Result<StarResponse, ServiceError> {
    let (store, session) = running_session(state, match_id).await?;
    let player = live::find_player(&store, match_id, player_id).await?;
    let catalog = state.catalog(match_id).await?;
    let entry = catalog
        .get(question_id)
        .ok_or_else(|| ServiceError::NotFound(format!("question {question_id}")))?;

    match entry.code {
        QuestionCode::FinishSlot { seat, .. } if seat == player.seat => {}
        _ => {
            return Err(ServiceError::InvalidState(
                "stars only go on your own finish questions".into(),
            ));
        }
    }
    if entry.question.value.is_none() {
        return Err(ServiceError::InvalidState("select your package first".into()));
    }
    if is_decided(&store, &session, question_id, player_id).await? {
        return Err(ServiceError::InvalidState("question already decided".into()));
    }

    let star = StarUseEntity {
        id: Uuid::new_v4(),
        match_id,
        player_id,
        question_id,
        outcome: None,
        declared_at: now_ms(),
    };
    if !store.insert_star(star.clone()).await? {
        debug!(%match_id, %player_id, "second star refused");
        return Err(ServiceError::InvalidState("star already used".into()));
    }
    sse_events::broadcast_star(state, &star, ChangeKind::Created);

    info!(%match_id, %player_id, %question_id, "star declared");
    Ok(StarResponse {
        star_id: star.id,
        question_id,
    })
}

/// Take back a declared star while its question is undecided.
pub async fn withdraw_star(
    state: &SharedState,
    match_id: Uuid,
    player_id: Uuid,
) -> Result<StarResponse, ServiceError> {
    let (store, session) = running_session(state, match_id).await?;
    let star = store
        .list_stars(match_id)
        .await?
        .into_iter()
        .find(|star| star.player_id == player_id)
        .ok_or_else(|| ServiceError::NotFound("no star declared".into()))?;

    if star.outcome.is_some()
        || is_decided(&store, &session, star.question_id, player_id).await?
    {
        return Err(ServiceError::InvalidState("question already decided".into()));
    }
    if !store.withdraw_star(star.id).await? {
        return Err(ServiceError::InvalidState("question already decided".into()));
    }
    sse_events::broadcast_star(state, &star, ChangeKind::Deleted);

    info!(%match_id, %player_id, question_id = %star.question_id, "star withdrawn");
    Ok(StarResponse {
        star_id: star.id,
        question_id: star.question_id,
    })
}

/// Reserve one fresh item per changed slot, or none at all.
async fn draw(
    store: &Arc<dyn LiveStore>,
    match_id: Uuid,
    player_id: Uuid,
    changes: &[(CatalogEntry, u8)],
) -> Result<Vec<PoolItemEntity>, ServiceError> {
    let pool = store.list_pool(match_id).await?;
    let reservations = store.list_reservations(match_id).await?;
    let mut taken_ids: HashSet<Uuid> = reservations.iter().map(|r| r.pool_item_id).collect();
    let mut taken_prints: HashSet<String> = reservations.into_iter().map(|r| r.fingerprint).collect();

    let mut drawn: Vec<PoolItemEntity> = Vec::with_capacity(changes.len());
    for (_, value) in changes {
        let item = loop {
            let candidates: Vec<&PoolItemEntity> = pool
                .iter()
                .filter(|item| item.value == *value && !taken_ids.contains(&item.id))
                .filter(|item| !taken_prints.contains(&fingerprint(&item.text, &item.answer)))
                .collect();
            let Some(pick) = pick_index(candidates.len()) else {
                break None;
            };
            let item = candidates[pick].clone();
            let print = fingerprint(&item.text, &item.answer);
            taken_ids.insert(item.id);
            taken_prints.insert(print.clone());

            let claimed = store
                .reserve_pool_item(PoolReservationEntity {
                    match_id,
                    pool_item_id: item.id,
                    player_id,
                    fingerprint: print,
                })
                .await;
            match claimed {
                Ok(true) => break Some(item),
                Ok(false) => continue,
                Err(err) => {
                    rollback(store, match_id, &drawn).await;
                    return Err(err.into());
                }
            }
        };

        match item {
            Some(item) => drawn.push(item),
            None => {
                rollback(store, match_id, &drawn).await;
                debug!(%match_id, %player_id, value, "finish pool tier exhausted");
                return Err(ServiceError::Exhausted(format!(
                    "no {value}-point questions left in the pool"
                )));
            }
        }
    }

    Ok(drawn)
}

/// Uniform index in `0..len`. Kept synchronous: the thread RNG cannot cross an await.
fn pick_index(len: usize) -> Option<usize> {
    (len > 0).then(|| rand::rng().random_range(0..len))
}

async fn rollback(store: &Arc<dyn LiveStore>, match_id: Uuid, drawn: &[PoolItemEntity]) {
    for item in drawn {
        if let Err(err) = store.release_pool_item(match_id, item.id).await {
            warn!(%match_id, pool_item_id = %item.id, error = %err, "could not release reservation");
        }
    }
}

fn slot_pool_item(slot: &CatalogEntry) -> Option<Uuid> {
    slot.question
        .meta
        .get(META_POOL_ITEM)
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
}

/// Whether the player was already decided on a finish question.
async fn is_decided(
    store: &Arc<dyn LiveStore>,
    session: &SessionEntity,
    question_id: Uuid,
    player_id: Uuid,
) -> Result<bool, ServiceError> {
    if session.current_question == Some(question_id)
        && (session.decided_players.contains(&player_id)
            || matches!(
                session.question_state,
                QuestionState::AnswerRevealed | QuestionState::Completed
            ))
    {
        return Ok(true);
    }
    Ok(store
        .list_answers(question_id)
        .await?
        .iter()
        .any(|answer| answer.player_id == player_id && answer.points_awarded.is_some()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::AnswerEntity,
        dto::moderator::ImportQuestionsRequest,
        services::{
            catalog_service, session_service,
            test_support::{Fixture, row, seat},
        },
    };

    async fn slot_fingerprints(fixture: &Fixture) -> Vec<(Uuid, String)> {
        let catalog = fixture.state.catalog(fixture.match_id).await.unwrap();
        catalog
            .entries()
            .iter()
            .filter(|entry| matches!(entry.code, QuestionCode::FinishSlot { .. }))
            .filter(|entry| entry.question.value.is_some())
            .map(|entry| {
                (
                    slot_pool_item(entry).unwrap(),
                    fingerprint(&entry.question.text, &entry.question.answer),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn packages_never_share_a_pool_item() {
        let fixture = Fixture::running().await;
        for (s, values) in [(1, [20, 20, 30]), (2, [30, 30, 20]), (3, [20, 30, 20]), (4, [30, 20, 30])] {
            select_package(&fixture.state, fixture.match_id, seat(&fixture, s), values.to_vec())
                .await
                .unwrap();
        }

        let slots = slot_fingerprints(&fixture).await;
        assert_eq!(slots.len(), 12);
        let ids: HashSet<_> = slots.iter().map(|(id, _)| *id).collect();
        let prints: HashSet<_> = slots.iter().map(|(_, print)| print.clone()).collect();
        assert_eq!(ids.len(), 12);
        assert_eq!(prints.len(), 12);
    }

    #[tokio::test]
    async fn duplicate_text_counts_as_used_and_exhaustion_rolls_back() {
        let fixture = Fixture::registered().await;
        catalog_service::import_questions(
            &fixture.state,
            fixture.match_id,
            ImportQuestionsRequest {
                rows: vec![
                    row("VD-20-1", "Same question", "Same answer"),
                    row("VD-20-2", " same  QUESTION", "same answer"),
                    row("VD-20-3", "Other question", "Other answer"),
                    row("VD-30-1", "Thirty", "Points"),
                ],
            },
        )
        .await
        .unwrap();
        session_service::open_session(&fixture.state, fixture.match_id)
            .await
            .unwrap();

        let err = select_package(&fixture.state, fixture.match_id, seat(&fixture, 1), vec![20, 20, 20])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Exhausted(reason) if reason.contains("20-point")));
        assert!(fixture
            .store
            .list_reservations(fixture.match_id)
            .await
            .unwrap()
            .is_empty());

        select_package(&fixture.state, fixture.match_id, seat(&fixture, 1), vec![20, 20, 30])
            .await
            .unwrap();
        let err = select_package(&fixture.state, fixture.match_id, seat(&fixture, 2), vec![20, 30, 30])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Exhausted(_)));
    }

    #[tokio::test]
    async fn reselection_only_redraws_changed_slots() {
        let fixture = Fixture::running().await;
        let player = seat(&fixture, 2);
        select_package(&fixture.state, fixture.match_id, player, vec![20, 20, 20])
            .await
            .unwrap();

        let before = fixture.state.catalog(fixture.match_id).await.unwrap();
        let kept = before.finish_slots(2)[0].question.clone();
        let changed = before.finish_slots(2)[1].question.clone();
        fixture
            .store
            .insert_answer(AnswerEntity {
                id: Uuid::new_v4(),
                match_id: fixture.match_id,
                question_id: changed.id,
                player_id: player,
                text: "draft".into(),
                submitted_at: now_ms(),
                response_time_ms: None,
                epoch_id: None,
                is_correct: None,
                points_awarded: None,
            })
            .await
            .unwrap();

        let response = select_package(&fixture.state, fixture.match_id, player, vec![20, 30, 20])
            .await
            .unwrap();
        assert_eq!(response.slots[1].value, 30);

        let after = fixture.state.catalog(fixture.match_id).await.unwrap();
        assert_eq!(after.finish_slots(2)[0].question.text, kept.text);
        assert_eq!(after.finish_slots(2)[1].question.value, Some(30));
        assert!(fixture.store.list_answers(changed.id).await.unwrap().is_empty());

        let reserved: HashSet<Uuid> = fixture
            .store
            .list_reservations(fixture.match_id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.pool_item_id)
            .collect();
        assert_eq!(reserved.len(), 3);
        assert!(!reserved.contains(&slot_pool_item(before.finish_slots(2)[1]).unwrap()));
    }

    #[tokio::test]
    async fn one_star_per_player_on_own_slots() {
        let fixture = Fixture::running().await;
        let player = seat(&fixture, 1);
        select_package(&fixture.state, fixture.match_id, player, vec![20, 30, 30])
            .await
            .unwrap();

        let foreign = fixture.question_id("VD2-1").await;
        assert!(declare_star(&fixture.state, fixture.match_id, player, foreign)
            .await
            .is_err());

        let first = fixture.question_id("VD1-1").await;
        let second = fixture.question_id("VD1-2").await;
        declare_star(&fixture.state, fixture.match_id, player, first)
            .await
            .unwrap();
        let err = declare_star(&fixture.state, fixture.match_id, player, second)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(reason) if reason == "star already used"));

        withdraw_star(&fixture.state, fixture.match_id, player)
            .await
            .unwrap();
        declare_star(&fixture.state, fixture.match_id, player, second)
            .await
            .unwrap();
    }
}
