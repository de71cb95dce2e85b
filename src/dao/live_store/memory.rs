//! In-process [`LiveStore`] backed by `dashmap`, used for local runs and tests.
//!
//! Each atomic primitive runs under a single map entry guard, which gives the same
//! guarantees the MongoDB store gets from conditional updates.

use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(test)]
use dashmap::DashSet;
use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use uuid::Uuid;

use super::LiveStore;
use crate::dao::{
    models::{
        AnswerEntity, BuzzerEventEntity, MatchEntity, PlayerEntity, PoolItemEntity,
        PoolReservationEntity, QuestionEntity, ScoreChangeEntity, ScoreEntity, ScoreKey,
        SessionEntity, StarOutcome, StarUseEntity,
    },
    storage::StorageResult,
};

/// Shared in-memory store; clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryLiveStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    matches: DashMap<Uuid, MatchEntity>,
    players: DashMap<Uuid, Vec<PlayerEntity>>,
    questions: DashMap<Uuid, Vec<QuestionEntity>>,
    pools: DashMap<Uuid, Vec<PoolItemEntity>>,
    sessions: DashMap<Uuid, SessionEntity>,
    buzzer_events: DashMap<Uuid, Vec<BuzzerEventEntity>>,
    buzzer_wins: DashMap<String, Uuid>,
    answers: DashMap<Uuid, Vec<AnswerEntity>>,
    scores: DashMap<ScoreKey, i32>,
    score_changes: DashMap<Uuid, Vec<ScoreChangeEntity>>,
    stars: DashMap<Uuid, Vec<StarUseEntity>>,
    reservations: DashMap<(Uuid, Uuid), PoolReservationEntity>,
    fingerprints: DashMap<(Uuid, String), Uuid>,
    #[cfg(test)]
    audit_offline: AtomicBool,
    #[cfg(test)]
    ledger_offline: DashSet<Uuid>,
}

impl MemoryInner {
    #[cfg(test)]
    fn audit_guard(&self) -> StorageResult<()> {
        if self.audit_offline.load(Ordering::SeqCst) {
            return Err(crate::dao::storage::StorageError::unavailable(
                "audit log offline".into(),
                std::io::Error::other("audit log offline"),
            ));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn audit_guard(&self) -> StorageResult<()> {
        Ok(())
    }

    #[cfg(test)]
    fn ledger_guard(&self, player_id: Uuid) -> StorageResult<()> {
        if self.ledger_offline.contains(&player_id) {
            return Err(crate::dao::storage::StorageError::unavailable(
                "ledger offline".into(),
                std::io::Error::other("ledger offline"),
            ));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn ledger_guard(&self, _player_id: Uuid) -> StorageResult<()> {
        Ok(())
    }
}

impl MemoryLiveStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make audit appends fail, to exercise the best-effort path.
    #[cfg(test)]
    pub fn set_audit_offline(&self, offline: bool) {
        self.inner.audit_offline.store(offline, Ordering::SeqCst);
    }

    /// Make score deltas of one player fail.
    #[cfg(test)]
    pub fn set_ledger_offline(&self, player_id: Uuid, offline: bool) {
        if offline {
            self.inner.ledger_offline.insert(player_id);
        } else {
            self.inner.ledger_offline.remove(&player_id);
        }
    }
}

impl LiveStore for MemoryLiveStore {
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.matches.insert(entity.id, entity);
            Ok(())
        })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.matches.get(&id).map(|entry| entry.clone())) })
    }

    fn list_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut matches: Vec<_> = inner.matches.iter().map(|e| e.value().clone()).collect();
            matches.sort_by_key(|m| m.created_at);
            Ok(matches)
        })
    }

    fn save_players(
        &self,
        match_id: Uuid,
        players: Vec<PlayerEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.players.insert(match_id, players);
            Ok(())
        })
    }

    fn list_players(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut players = inner
                .players
                .get(&match_id)
                .map(|entry| entry.clone())
                .unwrap_or_default();
            players.sort_by_key(|p| p.seat);
            Ok(players)
        })
    }

    fn set_player_disqualified(
        &self,
        match_id: Uuid,
        player_id: Uuid,
        disqualified: bool,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            if let Some(mut players) = inner.players.get_mut(&match_id) {
                for player in players.iter_mut().filter(|p| p.id == player_id) {
                    player.is_disqualified_obstacle = disqualified;
                }
            }
            Ok(())
        })
    }

    fn clear_disqualifications(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            if let Some(mut players) = inner.players.get_mut(&match_id) {
                for player in players.iter_mut() {
                    player.is_disqualified_obstacle = false;
                }
            }
            Ok(())
        })
    }

    fn replace_questions(
        &self,
        match_id: Uuid,
        questions: Vec<QuestionEntity>,
        pool: Vec<PoolItemEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.questions.insert(match_id, questions);
            inner.pools.insert(match_id, pool);
            inner.reservations.retain(|(m, _), _| *m != match_id);
            inner.fingerprints.retain(|(m, _), _| *m != match_id);
            Ok(())
        })
    }

    fn list_questions(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .questions
                .get(&match_id)
                .map(|entry| entry.clone())
                .unwrap_or_default())
        })
    }

    fn list_pool(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PoolItemEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .pools
                .get(&match_id)
                .map(|entry| entry.clone())
                .unwrap_or_default())
        })
    }

    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut questions = inner.questions.entry(question.match_id).or_default();
            match questions.iter().position(|q| q.id == question.id) {
                Some(index) => questions[index] = question,
                None => questions.push(question),
            }
            Ok(())
        })
    }

    fn find_session(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.sessions.get(&match_id).map(|entry| entry.clone())) })
    }

    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.sessions.insert(session.match_id, session);
            Ok(())
        })
    }

    fn compare_and_swap_session(
        &self,
        next: SessionEntity,
        expected_version: i64,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let Some(mut current) = inner.sessions.get_mut(&next.match_id) else {
                return Ok(false);
            };
            if current.version != expected_version {
                return Ok(false);
            }
            *current = next;
            Ok(true)
        })
    }

    fn append_buzzer_event(
        &self,
        event: BuzzerEventEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner
                .buzzer_events
                .entry(event.question_id)
                .or_default()
                .push(event);
            Ok(())
        })
    }

    fn list_buzzer_events(
        &self,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<BuzzerEventEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .buzzer_events
                .get(&question_id)
                .map(|entry| entry.clone())
                .unwrap_or_default())
        })
    }

    fn claim_buzzer_win(
        &self,
        epoch_key: String,
        event_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            match inner.buzzer_wins.entry(epoch_key) {
                Entry::Occupied(_) => Ok(false),
                Entry::Vacant(slot) => {
                    slot.insert(event_id);
                    Ok(true)
                }
            }
        })
    }

    fn insert_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner
                .answers
                .entry(answer.question_id)
                .or_default()
                .push(answer);
            Ok(())
        })
    }

    fn save_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut answers = inner.answers.entry(answer.question_id).or_default();
            match answers.iter().position(|a| a.id == answer.id) {
                Some(index) => answers[index] = answer,
                None => answers.push(answer),
            }
            Ok(())
        })
    }

    fn list_answers(
        &self,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .answers
                .get(&question_id)
                .map(|entry| entry.clone())
                .unwrap_or_default())
        })
    }

    fn delete_answers(
        &self,
        question_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let Some(mut answers) = inner.answers.get_mut(&question_id) else {
                return Ok(0);
            };
            let before = answers.len();
            answers.retain(|a| a.player_id != player_id);
            Ok((before - answers.len()) as u64)
        })
    }

    fn apply_score_delta(
        &self,
        key: ScoreKey,
        delta: i32,
    ) -> BoxFuture<'static, StorageResult<(i32, i32)>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ledger_guard(key.player_id)?;
            let mut points = inner.scores.entry(key).or_insert(0);
            let before = *points;
            let after = before.saturating_add(delta).max(0);
            *points = after;
            Ok((before, after))
        })
    }

    fn list_scores(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .scores
                .iter()
                .filter(|entry| entry.key().match_id == match_id)
                .map(|entry| ScoreEntity {
                    match_id,
                    player_id: entry.key().player_id,
                    round: entry.key().round,
                    points: *entry.value(),
                })
                .collect())
        })
    }

    fn append_score_change(
        &self,
        change: ScoreChangeEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.audit_guard()?;
            inner
                .score_changes
                .entry(change.match_id)
                .or_default()
                .push(change);
            Ok(())
        })
    }

    fn list_score_changes(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreChangeEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .score_changes
                .get(&match_id)
                .map(|entry| entry.clone())
                .unwrap_or_default())
        })
    }

    fn mark_score_change_reverted(
        &self,
        change_id: Uuid,
        revert_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            for mut changes in inner.score_changes.iter_mut() {
                if let Some(change) = changes.iter_mut().find(|c| c.id == change_id) {
                    if change.reverted_by.is_some() {
                        return Ok(false);
                    }
                    change.reverted_by = Some(revert_id);
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    fn clear_score_change_revert(
        &self,
        change_id: Uuid,
        revert_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            for mut changes in inner.score_changes.iter_mut() {
                if let Some(change) = changes.iter_mut().find(|c| c.id == change_id) {
                    if change.reverted_by != Some(revert_id) {
                        return Ok(false);
                    }
                    change.reverted_by = None;
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    fn insert_star(&self, star: StarUseEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut stars = inner.stars.entry(star.match_id).or_default();
            if stars.iter().any(|s| s.player_id == star.player_id) {
                return Ok(false);
            }
            stars.push(star);
            Ok(true)
        })
    }

    fn list_stars(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<StarUseEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .stars
                .get(&match_id)
                .map(|entry| entry.clone())
                .unwrap_or_default())
        })
    }

    fn finalize_star(
        &self,
        star_id: Uuid,
        outcome: StarOutcome,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            for mut stars in inner.stars.iter_mut() {
                if let Some(star) = stars.iter_mut().find(|s| s.id == star_id) {
                    if star.outcome.is_some() {
                        return Ok(false);
                    }
                    star.outcome = Some(outcome);
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    fn withdraw_star(&self, star_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            for mut stars in inner.stars.iter_mut() {
                if let Some(index) = stars.iter().position(|s| s.id == star_id) {
                    if stars[index].outcome.is_some() {
                        return Ok(false);
                    }
                    stars.remove(index);
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    fn reserve_pool_item(
        &self,
        reservation: PoolReservationEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let item_key = (reservation.match_id, reservation.pool_item_id);
            let fingerprint_key = (reservation.match_id, reservation.fingerprint.clone());
            let pool_item_id = reservation.pool_item_id;

            match inner.reservations.entry(item_key) {
                Entry::Occupied(_) => return Ok(false),
                Entry::Vacant(slot) => {
                    slot.insert(reservation);
                }
            }

            match inner.fingerprints.entry(fingerprint_key) {
                Entry::Occupied(_) => {
                    inner.reservations.remove(&item_key);
                    Ok(false)
                }
                Entry::Vacant(slot) => {
                    slot.insert(pool_item_id);
                    Ok(true)
                }
            }
        })
    }

    fn release_pool_item(
        &self,
        match_id: Uuid,
        pool_item_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            if let Some((_, reservation)) = inner.reservations.remove(&(match_id, pool_item_id)) {
                inner
                    .fingerprints
                    .remove_if(&(match_id, reservation.fingerprint), |_, owner| {
                        *owner == pool_item_id
                    });
            }
            Ok(())
        })
    }

    fn list_reservations(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PoolReservationEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .reservations
                .iter()
                .filter(|entry| entry.key().0 == match_id)
                .map(|entry| entry.value().clone())
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::RoundKind;

    fn key() -> ScoreKey {
        ScoreKey {
            match_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            round: RoundKind::Opening,
        }
    }

    #[tokio::test]
    async fn score_delta_is_floored_at_zero() {
        let store = MemoryLiveStore::new();
        let key = key();

        assert_eq!(store.apply_score_delta(key, 10).await.unwrap(), (0, 10));
        assert_eq!(store.apply_score_delta(key, -25).await.unwrap(), (10, 0));
        assert_eq!(store.apply_score_delta(key, 5).await.unwrap(), (0, 5));
    }

    #[tokio::test]
    async fn buzzer_win_can_only_be_claimed_once_per_epoch() {
        let store = MemoryLiveStore::new();

        assert!(store.claim_buzzer_win("epoch-a".into(), Uuid::new_v4()).await.unwrap());
        assert!(!store.claim_buzzer_win("epoch-a".into(), Uuid::new_v4()).await.unwrap());
        assert!(store.claim_buzzer_win("epoch-b".into(), Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn session_swap_rejects_stale_versions() {
        let store = MemoryLiveStore::new();
        let session = SessionEntity::pending(Uuid::new_v4(), 0);
        store.insert_session(session.clone()).await.unwrap();

        let mut next = session.clone();
        next.version = 1;
        assert!(store.compare_and_swap_session(next.clone(), 0).await.unwrap());
        assert!(!store.compare_and_swap_session(next, 0).await.unwrap());
    }

    #[tokio::test]
    async fn reservations_are_unique_by_item_and_fingerprint() {
        let store = MemoryLiveStore::new();
        let match_id = Uuid::new_v4();
        let item = Uuid::new_v4();
        let reservation = |pool_item_id, fingerprint: &str| PoolReservationEntity {
            match_id,
            pool_item_id,
            player_id: Uuid::new_v4(),
            fingerprint: fingerprint.into(),
        };

        assert!(store.reserve_pool_item(reservation(item, "a")).await.unwrap());
        assert!(!store.reserve_pool_item(reservation(item, "b")).await.unwrap());
        assert!(!store.reserve_pool_item(reservation(Uuid::new_v4(), "a")).await.unwrap());

        store.release_pool_item(match_id, item).await.unwrap();
        assert!(store.reserve_pool_item(reservation(Uuid::new_v4(), "a")).await.unwrap());
        assert_eq!(store.list_reservations(match_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reverting_twice_is_refused() {
        let store = MemoryLiveStore::new();
        let change = ScoreChangeEntity {
            id: Uuid::new_v4(),
            match_id: Uuid::new_v4(),
            player_id: Uuid::new_v4(),
            round: RoundKind::Speed,
            question_id: None,
            source: crate::dao::models::ScoreChangeSource::Manual,
            requested_delta: 10,
            applied_delta: 10,
            points_before: 0,
            points_after: 10,
            reason: Some("fix".into()),
            revert_of: None,
            reverted_by: None,
            created_at: 0,
        };
        store.append_score_change(change.clone()).await.unwrap();

        assert!(store.mark_score_change_reverted(change.id, Uuid::new_v4()).await.unwrap());
        assert!(!store.mark_score_change_reverted(change.id, Uuid::new_v4()).await.unwrap());
    }
}
