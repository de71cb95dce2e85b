use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{Bson, Document, doc},
    options::{IndexOptions, ReturnDocument, UpdateModifications},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
};
use crate::dao::{
    live_store::LiveStore,
    models::{
        AnswerEntity, BuzzerEventEntity, MatchEntity, PlayerEntity, PoolItemEntity,
        PoolReservationEntity, QuestionEntity, ScoreChangeEntity, ScoreEntity, ScoreKey,
        SessionEntity, StarOutcome, StarUseEntity,
    },
    storage::StorageResult,
};

const MATCHES: &str = "matches";
const PLAYERS: &str = "players";
const QUESTIONS: &str = "questions";
const POOL_ITEMS: &str = "pool_items";
const SESSIONS: &str = "sessions";
const BUZZER_EVENTS: &str = "buzzer_events";
const BUZZER_WINS: &str = "buzzer_wins";
const ANSWERS: &str = "answers";
const SCORES: &str = "match_scores";
const SCORE_CHANGES: &str = "score_changes";
const STARS: &str = "star_uses";
const POOL_RESERVATIONS: &str = "pool_reservations";

/// [`LiveStore`] persisting every entity in its own MongoDB collection.
#[derive(Clone)]
pub struct MongoLiveStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (_client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

fn by_id(id: Uuid) -> Document {
    doc! { "id": id.to_string() }
}

fn by_match(match_id: Uuid) -> Document {
    doc! { "match_id": match_id.to_string() }
}

fn star_outcome_key(outcome: StarOutcome) -> &'static str {
    match outcome {
        StarOutcome::Applied => "applied",
        StarOutcome::Wasted => "wasted",
    }
}

fn read_points(document: &Document) -> MongoResult<i32> {
    match document.get("points") {
        Some(Bson::Int32(points)) => Ok(*points),
        Some(Bson::Int64(points)) => {
            i32::try_from(*points).map_err(|_| MongoDaoError::Malformed {
                collection: SCORES,
                message: format!("points out of range: {points}"),
            })
        }
        None => Ok(0),
        Some(other) => Err(MongoDaoError::Malformed {
            collection: SCORES,
            message: format!("points has unexpected type {:?}", other.element_type()),
        }),
    }
}

impl MongoLiveStore {
    /// Connect to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (_client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                database: RwLock::new(database),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn database(&self) -> Database {
        self.inner.database.read().await.clone()
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database().await.collection::<T>(name)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let indexes: [(&'static str, &'static str, Document, bool); 14] = [
            (MATCHES, "match_id_idx", doc! { "id": 1 }, true),
            (PLAYERS, "player_match_idx", doc! { "match_id": 1, "id": 1 }, true),
            (QUESTIONS, "question_id_idx", doc! { "id": 1 }, true),
            (QUESTIONS, "question_match_idx", doc! { "match_id": 1, "position": 1 }, false),
            (POOL_ITEMS, "pool_match_idx", doc! { "match_id": 1, "value": 1 }, false),
            (SESSIONS, "session_match_idx", doc! { "match_id": 1 }, true),
            (BUZZER_EVENTS, "buzzer_question_idx", doc! { "question_id": 1, "occurred_at": 1 }, false),
            (ANSWERS, "answer_question_idx", doc! { "question_id": 1, "submitted_at": 1 }, false),
            (SCORES, "score_match_idx", doc! { "match_id": 1 }, false),
            (SCORE_CHANGES, "score_change_id_idx", doc! { "id": 1 }, true),
            (SCORE_CHANGES, "score_change_match_idx", doc! { "match_id": 1, "created_at": 1 }, false),
            (STARS, "star_player_idx", doc! { "match_id": 1, "player_id": 1 }, true),
            (POOL_RESERVATIONS, "reservation_item_idx", doc! { "match_id": 1, "pool_item_id": 1 }, true),
            (POOL_RESERVATIONS, "reservation_fingerprint_idx", doc! { "match_id": 1, "fingerprint": 1 }, true),
        ];

        let database = self.database().await;
        for (collection, name, keys, unique) in indexes {
            let index = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(name.to_owned()))
                        .unique(Some(unique))
                        .build(),
                )
                .build();

            database
                .collection::<Document>(collection)
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index: name,
                    source,
                })?;
        }

        Ok(())
    }

    async fn save_match(&self, entity: MatchEntity) -> MongoResult<()> {
        self.collection::<MatchEntity>(MATCHES)
            .await
            .replace_one(by_id(entity.id), &entity)
            .upsert(true)
            .await
            .map_err(MongoDaoError::write(MATCHES, "save"))?;
        Ok(())
    }

    async fn find_match(&self, id: Uuid) -> MongoResult<Option<MatchEntity>> {
        self.collection::<MatchEntity>(MATCHES)
            .await
            .find_one(by_id(id))
            .await
            .map_err(MongoDaoError::read(MATCHES, "find"))
    }

    async fn list_matches(&self) -> MongoResult<Vec<MatchEntity>> {
        self.collection::<MatchEntity>(MATCHES)
            .await
            .find(doc! {})
            .sort(doc! { "created_at": 1 })
            .await
            .map_err(MongoDaoError::read(MATCHES, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(MATCHES, "list"))
    }

    async fn save_players(&self, match_id: Uuid, players: Vec<PlayerEntity>) -> MongoResult<()> {
        let collection = self.collection::<PlayerEntity>(PLAYERS).await;
        collection
            .delete_many(by_match(match_id))
            .await
            .map_err(MongoDaoError::write(PLAYERS, "replace"))?;
        if !players.is_empty() {
            collection
                .insert_many(players)
                .await
                .map_err(MongoDaoError::write(PLAYERS, "replace"))?;
        }
        Ok(())
    }

    async fn list_players(&self, match_id: Uuid) -> MongoResult<Vec<PlayerEntity>> {
        self.collection::<PlayerEntity>(PLAYERS)
            .await
            .find(by_match(match_id))
            .sort(doc! { "seat": 1 })
            .await
            .map_err(MongoDaoError::read(PLAYERS, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(PLAYERS, "list"))
    }

    async fn set_player_disqualified(
        &self,
        match_id: Uuid,
        player_id: Uuid,
        disqualified: bool,
    ) -> MongoResult<()> {
        self.collection::<PlayerEntity>(PLAYERS)
            .await
            .update_one(
                doc! { "match_id": match_id.to_string(), "id": player_id.to_string() },
                doc! { "$set": { "is_disqualified_obstacle": disqualified } },
            )
            .await
            .map_err(MongoDaoError::write(PLAYERS, "disqualify"))?;
        Ok(())
    }

    async fn clear_disqualifications(&self, match_id: Uuid) -> MongoResult<()> {
        self.collection::<PlayerEntity>(PLAYERS)
            .await
            .update_many(
                by_match(match_id),
                doc! { "$set": { "is_disqualified_obstacle": false } },
            )
            .await
            .map_err(MongoDaoError::write(PLAYERS, "clear disqualifications"))?;
        Ok(())
    }

    async fn replace_questions(
        &self,
        match_id: Uuid,
        questions: Vec<QuestionEntity>,
        pool: Vec<PoolItemEntity>,
    ) -> MongoResult<()> {
        let database = self.database().await;
        for collection in [QUESTIONS, POOL_ITEMS, POOL_RESERVATIONS] {
            database
                .collection::<Document>(collection)
                .delete_many(by_match(match_id))
                .await
                .map_err(MongoDaoError::write(collection, "replace"))?;
        }

        if !questions.is_empty() {
            database
                .collection::<QuestionEntity>(QUESTIONS)
                .insert_many(questions)
                .await
                .map_err(MongoDaoError::write(QUESTIONS, "replace"))?;
        }
        if !pool.is_empty() {
            database
                .collection::<PoolItemEntity>(POOL_ITEMS)
                .insert_many(pool)
                .await
                .map_err(MongoDaoError::write(POOL_ITEMS, "replace"))?;
        }
        Ok(())
    }

    async fn list_questions(&self, match_id: Uuid) -> MongoResult<Vec<QuestionEntity>> {
        self.collection::<QuestionEntity>(QUESTIONS)
            .await
            .find(by_match(match_id))
            .sort(doc! { "position": 1 })
            .await
            .map_err(MongoDaoError::read(QUESTIONS, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(QUESTIONS, "list"))
    }

    async fn list_pool(&self, match_id: Uuid) -> MongoResult<Vec<PoolItemEntity>> {
        self.collection::<PoolItemEntity>(POOL_ITEMS)
            .await
            .find(by_match(match_id))
            .await
            .map_err(MongoDaoError::read(POOL_ITEMS, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(POOL_ITEMS, "list"))
    }

    async fn save_question(&self, question: QuestionEntity) -> MongoResult<()> {
        self.collection::<QuestionEntity>(QUESTIONS)
            .await
            .replace_one(by_id(question.id), &question)
            .upsert(true)
            .await
            .map_err(MongoDaoError::write(QUESTIONS, "save"))?;
        Ok(())
    }

    async fn find_session(&self, match_id: Uuid) -> MongoResult<Option<SessionEntity>> {
        self.collection::<SessionEntity>(SESSIONS)
            .await
            .find_one(by_match(match_id))
            .await
            .map_err(MongoDaoError::read(SESSIONS, "find"))
    }

    async fn insert_session(&self, session: SessionEntity) -> MongoResult<()> {
        self.collection::<SessionEntity>(SESSIONS)
            .await
            .replace_one(by_match(session.match_id), &session)
            .upsert(true)
            .await
            .map_err(MongoDaoError::write(SESSIONS, "insert"))?;
        Ok(())
    }

    async fn compare_and_swap_session(
        &self,
        next: SessionEntity,
        expected_version: i64,
    ) -> MongoResult<bool> {
        let result = self
            .collection::<SessionEntity>(SESSIONS)
            .await
            .replace_one(
                doc! { "match_id": next.match_id.to_string(), "version": expected_version },
                &next,
            )
            .await
            .map_err(MongoDaoError::write(SESSIONS, "compare and swap"))?;
        Ok(result.matched_count == 1)
    }

    async fn append_buzzer_event(&self, event: BuzzerEventEntity) -> MongoResult<()> {
        self.collection::<BuzzerEventEntity>(BUZZER_EVENTS)
            .await
            .insert_one(&event)
            .await
            .map_err(MongoDaoError::write(BUZZER_EVENTS, "append"))?;
        Ok(())
    }

    async fn list_buzzer_events(&self, question_id: Uuid) -> MongoResult<Vec<BuzzerEventEntity>> {
        self.collection::<BuzzerEventEntity>(BUZZER_EVENTS)
            .await
            .find(doc! { "question_id": question_id.to_string() })
            .sort(doc! { "occurred_at": 1, "_id": 1 })
            .await
            .map_err(MongoDaoError::read(BUZZER_EVENTS, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(BUZZER_EVENTS, "list"))
    }

    async fn claim_buzzer_win(&self, epoch_key: String, event_id: Uuid) -> MongoResult<bool> {
        let claim = doc! { "_id": epoch_key, "event_id": event_id.to_string() };
        match self
            .collection::<Document>(BUZZER_WINS)
            .await
            .insert_one(claim)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::Write {
                collection: BUZZER_WINS,
                operation: "claim",
                source,
            }),
        }
    }

    async fn insert_answer(&self, answer: AnswerEntity) -> MongoResult<()> {
        self.collection::<AnswerEntity>(ANSWERS)
            .await
            .insert_one(&answer)
            .await
            .map_err(MongoDaoError::write(ANSWERS, "insert"))?;
        Ok(())
    }

    async fn save_answer(&self, answer: AnswerEntity) -> MongoResult<()> {
        self.collection::<AnswerEntity>(ANSWERS)
            .await
            .replace_one(by_id(answer.id), &answer)
            .upsert(true)
            .await
            .map_err(MongoDaoError::write(ANSWERS, "save"))?;
        Ok(())
    }

    async fn list_answers(&self, question_id: Uuid) -> MongoResult<Vec<AnswerEntity>> {
        self.collection::<AnswerEntity>(ANSWERS)
            .await
            .find(doc! { "question_id": question_id.to_string() })
            .sort(doc! { "submitted_at": 1, "_id": 1 })
            .await
            .map_err(MongoDaoError::read(ANSWERS, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(ANSWERS, "list"))
    }

    async fn delete_answers(&self, question_id: Uuid, player_id: Uuid) -> MongoResult<u64> {
        let result = self
            .collection::<AnswerEntity>(ANSWERS)
            .await
            .delete_many(doc! {
                "question_id": question_id.to_string(),
                "player_id": player_id.to_string(),
            })
            .await
            .map_err(MongoDaoError::write(ANSWERS, "delete"))?;
        Ok(result.deleted_count)
    }

    /// Single-document pipeline update: the floor is evaluated by the server so
    /// concurrent deltas on the same key serialise.
    async fn apply_score_delta(&self, key: ScoreKey, delta: i32) -> MongoResult<(i32, i32)> {
        let pipeline = vec![doc! {
            "$set": {
                "match_id": key.match_id.to_string(),
                "player_id": key.player_id.to_string(),
                "round": key.round.as_str(),
                "points": {
                    "$max": [0, { "$add": [{ "$ifNull": ["$points", 0] }, delta] }]
                },
            }
        }];

        let previous = self
            .collection::<Document>(SCORES)
            .await
            .find_one_and_update(
                doc! { "_id": key.storage_id() },
                UpdateModifications::Pipeline(pipeline),
            )
            .upsert(true)
            .return_document(ReturnDocument::Before)
            .await
            .map_err(MongoDaoError::write(SCORES, "apply delta"))?;

        let before = match previous {
            Some(document) => read_points(&document)?,
            None => 0,
        };
        Ok((before, before.saturating_add(delta).max(0)))
    }

    async fn list_scores(&self, match_id: Uuid) -> MongoResult<Vec<ScoreEntity>> {
        self.collection::<ScoreEntity>(SCORES)
            .await
            .find(by_match(match_id))
            .await
            .map_err(MongoDaoError::read(SCORES, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(SCORES, "list"))
    }

    async fn append_score_change(&self, change: ScoreChangeEntity) -> MongoResult<()> {
        self.collection::<ScoreChangeEntity>(SCORE_CHANGES)
            .await
            .insert_one(&change)
            .await
            .map_err(MongoDaoError::write(SCORE_CHANGES, "append"))?;
        Ok(())
    }

    async fn list_score_changes(&self, match_id: Uuid) -> MongoResult<Vec<ScoreChangeEntity>> {
        self.collection::<ScoreChangeEntity>(SCORE_CHANGES)
            .await
            .find(by_match(match_id))
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await
            .map_err(MongoDaoError::read(SCORE_CHANGES, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(SCORE_CHANGES, "list"))
    }

    async fn mark_score_change_reverted(
        &self,
        change_id: Uuid,
        revert_id: Uuid,
    ) -> MongoResult<bool> {
        let result = self
            .collection::<ScoreChangeEntity>(SCORE_CHANGES)
            .await
            .update_one(
                doc! { "id": change_id.to_string(), "reverted_by": null },
                doc! { "$set": { "reverted_by": revert_id.to_string() } },
            )
            .await
            .map_err(MongoDaoError::write(SCORE_CHANGES, "mark reverted"))?;
        Ok(result.modified_count == 1)
    }

    async fn clear_score_change_revert(
        &self,
        change_id: Uuid,
        revert_id: Uuid,
    ) -> MongoResult<bool> {
        let result = self
            .collection::<ScoreChangeEntity>(SCORE_CHANGES)
            .await
            .update_one(
                doc! { "id": change_id.to_string(), "reverted_by": revert_id.to_string() },
                doc! { "$set": { "reverted_by": null } },
            )
            .await
            .map_err(MongoDaoError::write(SCORE_CHANGES, "clear revert"))?;
        Ok(result.modified_count == 1)
    }

    async fn insert_star(&self, star: StarUseEntity) -> MongoResult<bool> {
        match self
            .collection::<StarUseEntity>(STARS)
            .await
            .insert_one(&star)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::Write {
                collection: STARS,
                operation: "insert",
                source,
            }),
        }
    }

    async fn list_stars(&self, match_id: Uuid) -> MongoResult<Vec<StarUseEntity>> {
        self.collection::<StarUseEntity>(STARS)
            .await
            .find(by_match(match_id))
            .await
            .map_err(MongoDaoError::read(STARS, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(STARS, "list"))
    }

    async fn finalize_star(&self, star_id: Uuid, outcome: StarOutcome) -> MongoResult<bool> {
        let result = self
            .collection::<StarUseEntity>(STARS)
            .await
            .update_one(
                doc! { "id": star_id.to_string(), "outcome": null },
                doc! { "$set": { "outcome": star_outcome_key(outcome) } },
            )
            .await
            .map_err(MongoDaoError::write(STARS, "finalize"))?;
        Ok(result.modified_count == 1)
    }

    async fn withdraw_star(&self, star_id: Uuid) -> MongoResult<bool> {
        let result = self
            .collection::<StarUseEntity>(STARS)
            .await
            .delete_one(doc! { "id": star_id.to_string(), "outcome": null })
            .await
            .map_err(MongoDaoError::write(STARS, "withdraw"))?;
        Ok(result.deleted_count == 1)
    }

    /// Both unique indexes are checked by the same insert.
    async fn reserve_pool_item(&self, reservation: PoolReservationEntity) -> MongoResult<bool> {
        match self
            .collection::<PoolReservationEntity>(POOL_RESERVATIONS)
            .await
            .insert_one(&reservation)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::Write {
                collection: POOL_RESERVATIONS,
                operation: "reserve",
                source,
            }),
        }
    }

    async fn release_pool_item(&self, match_id: Uuid, pool_item_id: Uuid) -> MongoResult<()> {
        self.collection::<PoolReservationEntity>(POOL_RESERVATIONS)
            .await
            .delete_one(doc! {
                "match_id": match_id.to_string(),
                "pool_item_id": pool_item_id.to_string(),
            })
            .await
            .map_err(MongoDaoError::write(POOL_RESERVATIONS, "release"))?;
        Ok(())
    }

    async fn list_reservations(&self, match_id: Uuid) -> MongoResult<Vec<PoolReservationEntity>> {
        self.collection::<PoolReservationEntity>(POOL_RESERVATIONS)
            .await
            .find(by_match(match_id))
            .await
            .map_err(MongoDaoError::read(POOL_RESERVATIONS, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::read(POOL_RESERVATIONS, "list"))
    }
}

impl LiveStore for MongoLiveStore {
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_match(entity).await.map_err(Into::into) })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_match(id).await.map_err(Into::into) })
    }

    fn list_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_matches().await.map_err(Into::into) })
    }

    fn save_players(
        &self,
        match_id: Uuid,
        players: Vec<PlayerEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_players(match_id, players).await.map_err(Into::into) })
    }

    fn list_players(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_players(match_id).await.map_err(Into::into) })
    }

    fn set_player_disqualified(
        &self,
        match_id: Uuid,
        player_id: Uuid,
        disqualified: bool,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_player_disqualified(match_id, player_id, disqualified)
                .await
                .map_err(Into::into)
        })
    }

    fn clear_disqualifications(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.clear_disqualifications(match_id).await.map_err(Into::into) })
    }

    fn replace_questions(
        &self,
        match_id: Uuid,
        questions: Vec<QuestionEntity>,
        pool: Vec<PoolItemEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_questions(match_id, questions, pool)
                .await
                .map_err(Into::into)
        })
    }

    fn list_questions(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_questions(match_id).await.map_err(Into::into) })
    }

    fn list_pool(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PoolItemEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_pool(match_id).await.map_err(Into::into) })
    }

    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_question(question).await.map_err(Into::into) })
    }

    fn find_session(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(match_id).await.map_err(Into::into) })
    }

    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await.map_err(Into::into) })
    }

    fn compare_and_swap_session(
        &self,
        next: SessionEntity,
        expected_version: i64,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .compare_and_swap_session(next, expected_version)
                .await
                .map_err(Into::into)
        })
    }

    fn append_buzzer_event(
        &self,
        event: BuzzerEventEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_buzzer_event(event).await.map_err(Into::into) })
    }

    fn list_buzzer_events(
        &self,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<BuzzerEventEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_buzzer_events(question_id).await.map_err(Into::into) })
    }

    fn claim_buzzer_win(
        &self,
        epoch_key: String,
        event_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .claim_buzzer_win(epoch_key, event_id)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_answer(answer).await.map_err(Into::into) })
    }

    fn save_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_answer(answer).await.map_err(Into::into) })
    }

    fn list_answers(
        &self,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_answers(question_id).await.map_err(Into::into) })
    }

    fn delete_answers(
        &self,
        question_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_answers(question_id, player_id)
                .await
                .map_err(Into::into)
        })
    }

    fn apply_score_delta(
        &self,
        key: ScoreKey,
        delta: i32,
    ) -> BoxFuture<'static, StorageResult<(i32, i32)>> {
        let store = self.clone();
        Box::pin(async move { store.apply_score_delta(key, delta).await.map_err(Into::into) })
    }

    fn list_scores(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_scores(match_id).await.map_err(Into::into) })
    }

    fn append_score_change(
        &self,
        change: ScoreChangeEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_score_change(change).await.map_err(Into::into) })
    }

    fn list_score_changes(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreChangeEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_score_changes(match_id).await.map_err(Into::into) })
    }

    fn mark_score_change_reverted(
        &self,
        change_id: Uuid,
        revert_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .mark_score_change_reverted(change_id, revert_id)
                .await
                .map_err(Into::into)
        })
    }

    fn clear_score_change_revert(
        &self,
        change_id: Uuid,
        revert_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .clear_score_change_revert(change_id, revert_id)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_star(&self, star: StarUseEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.insert_star(star).await.map_err(Into::into) })
    }

    fn list_stars(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<StarUseEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_stars(match_id).await.map_err(Into::into) })
    }

    fn finalize_star(
        &self,
        star_id: Uuid,
        outcome: StarOutcome,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.finalize_star(star_id, outcome).await.map_err(Into::into) })
    }

    fn withdraw_star(&self, star_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.withdraw_star(star_id).await.map_err(Into::into) })
    }

    fn reserve_pool_item(
        &self,
        reservation: PoolReservationEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.reserve_pool_item(reservation).await.map_err(Into::into) })
    }

    fn release_pool_item(
        &self,
        match_id: Uuid,
        pool_item_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .release_pool_item(match_id, pool_item_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_reservations(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PoolReservationEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_reservations(match_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
