/// In-process backend used by tests and storage-less runs.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{
        AnswerEntity, BuzzerEventEntity, MatchEntity, PlayerEntity, PoolItemEntity,
        PoolReservationEntity, QuestionEntity, ScoreChangeEntity, ScoreEntity, ScoreKey,
        SessionEntity, StarOutcome, StarUseEntity,
    },
    storage::StorageResult,
};

/// Persistence of everything a live match touches.
///
/// Every method that guards a concurrency invariant is atomic inside the backend:
/// session writes are compare-and-swap on `version`, buzzer wins, stars and pool
/// reservations are insert-if-absent, and ledger deltas are a single clamped
/// read-modify-write. Callers never hold in-process locks across these calls.
pub trait LiveStore: Send + Sync {
    /// Insert or replace a match.
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Match by identifier.
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// Every known match.
    fn list_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>>;

    /// Replace the full seat list of a match.
    fn save_players(
        &self,
        match_id: Uuid,
        players: Vec<PlayerEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Seats of a match, ordered by seat number.
    fn list_players(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    /// Toggle the obstacle disqualification of one player.
    fn set_player_disqualified(
        &self,
        match_id: Uuid,
        player_id: Uuid,
        disqualified: bool,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Lift every obstacle disqualification of a match.
    fn clear_disqualifications(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<()>>;

    /// Replace the question set and finish pool of a match.
    fn replace_questions(
        &self,
        match_id: Uuid,
        questions: Vec<QuestionEntity>,
        pool: Vec<PoolItemEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Questions of a match ordered by round and position.
    fn list_questions(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>>;
    /// Finish-round pool of a match.
    fn list_pool(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PoolItemEntity>>>;
    /// Replace a single question, used when a package slot receives its payload.
    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>>;

    /// Session of a match.
    fn find_session(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Create the session of a match.
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Write `next` only if the stored version still equals `expected_version`.
    fn compare_and_swap_session(
        &self,
        next: SessionEntity,
        expected_version: i64,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Append to the buzzer log.
    fn append_buzzer_event(
        &self,
        event: BuzzerEventEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Events of a question in commit order.
    fn list_buzzer_events(
        &self,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<BuzzerEventEntity>>>;
    /// Claim the win of an epoch; `false` when someone else already holds it.
    fn claim_buzzer_win(
        &self,
        epoch_key: String,
        event_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Record a new submission.
    fn insert_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace a submission, used to store the verdict.
    fn save_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Answers of a question in submission order.
    fn list_answers(
        &self,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>>;
    /// Remove the submissions of one player on a question, returning how many went.
    fn delete_answers(
        &self,
        question_id: Uuid,
        player_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>>;

    /// Apply `delta` with a zero floor, returning the total before and after.
    fn apply_score_delta(
        &self,
        key: ScoreKey,
        delta: i32,
    ) -> BoxFuture<'static, StorageResult<(i32, i32)>>;
    /// Ledger rows of a match.
    fn list_scores(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>>;

    /// Append an audit entry.
    fn append_score_change(
        &self,
        change: ScoreChangeEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Audit entries of a match, oldest first.
    fn list_score_changes(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreChangeEntity>>>;
    /// Mark `change_id` as reverted by `revert_id`; `false` if it already was.
    fn mark_score_change_reverted(
        &self,
        change_id: Uuid,
        revert_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Drop the revert mark `revert_id` left on `change_id` by a reversal that never
    /// reached the ledger; `false` if the mark is no longer that one.
    fn clear_score_change_revert(
        &self,
        change_id: Uuid,
        revert_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Record a star; `false` when the player already used theirs in this match.
    fn insert_star(&self, star: StarUseEntity) -> BoxFuture<'static, StorageResult<bool>>;
    /// Star declarations of a match.
    fn list_stars(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<StarUseEntity>>>;
    /// Set the outcome of a declared star; `false` if it was already final.
    fn finalize_star(
        &self,
        star_id: Uuid,
        outcome: StarOutcome,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Remove a still-declared star; `false` if it is final or gone.
    fn withdraw_star(&self, star_id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;

    /// Reserve a pool item by identity and fingerprint; `false` if either is taken.
    fn reserve_pool_item(
        &self,
        reservation: PoolReservationEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Free a reserved pool item.
    fn release_pool_item(
        &self,
        match_id: Uuid,
        pool_item_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Pool reservations of a match.
    fn list_reservations(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<PoolReservationEntity>>>;

    /// Cheap round trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Rebuild the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
