//! Scoring engine: decisions, manual edits, undo and the ledger read models.
//!
//! Every point movement goes through [`apply_change`]: one atomic clamped delta on the
//! ledger row, then a best-effort audit entry. A failed ledger write fails the call; a
//! failed audit write is only logged.

use std::{collections::HashSet, sync::Arc};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        live_store::LiveStore,
        models::{
            AnswerEntity, BuzzKind, QuestionState, RoundKind, ScoreChangeEntity, ScoreChangeSource, ScoreKey,
            SessionEntity, StarUseEntity,
        },
    },
    dto::{
        common::{ScoreChangeView, ScoreboardRow},
        moderator::{
            BatchDecisionRequest, BatchDecisionResponse, DecisionResponse, ManualAdjustRequest,
            ResetScoresResponse, ScoreUpdateResponse, SetTotalRequest, TransferView, UndoResponse,
        },
        sse::ChangeKind,
    },
    error::ServiceError,
    scoring::{Decision, RuleContext, evaluate},
    services::{
        buzzer_service::epoch_winner,
        live::{self, LiveQuestion, insert_reset, persist_question},
        sse_events,
    },
    state::{
        SharedState,
        catalog::{META_RESOLVED, QuestionCode},
        now_ms,
        state_machine::{self, SessionEvent},
    },
};

const MAX_UNDO_ATTEMPTS: usize = 3;
const TARGET_MISMATCH: &str = "target mismatch: this player cannot be scored on the question";

/// One ledger movement and the audit entry describing it.
struct LedgerWrite {
    id: Uuid,
    key: ScoreKey,
    question_id: Option<Uuid>,
    source: ScoreChangeSource,
    requested: i32,
    reason: Option<String>,
    revert_of: Option<Uuid>,
}

impl LedgerWrite {
    fn new(key: ScoreKey, source: ScoreChangeSource, requested: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            question_id: None,
            source,
            requested,
            reason: None,
            revert_of: None,
        }
    }
}

/// Who is being scored on the current question, and under which rule row.
struct Scorable {
    context: RuleContext,
    source: ScoreChangeSource,
    /// Star the decided player declared on this question.
    star: Option<StarUseEntity>,
    /// Primary player of a finish question, debited by a successful steal.
    primary: Option<Uuid>,
}

impl Scorable {
    fn plain(context: RuleContext) -> Self {
        Self {
            context,
            source: ScoreChangeSource::Decision,
            star: None,
            primary: None,
        }
    }
}

/// Grade one player on the current question and apply the resulting points.
///
/// A correct speed answer is ranked by response time against the other correct
/// answers of the question.
pub async fn record_decision(
    state: &SharedState,
    match_id: Uuid,
    player_id: Uuid,
    decision: Decision,
) -> Result<DecisionResponse, ServiceError> {
    decide(state, match_id, player_id, decision, None).await
}

async fn decide(
    state: &SharedState,
    match_id: Uuid,
    player_id: Uuid,
    decision: Decision,
    confirmed_rank: Option<u32>,
) -> Result<DecisionResponse, ServiceError> {
    let live = live::live_question(state, match_id).await?;
    let store = live.store.clone();
    let question = live.entry.question.clone();
    let display = live.session.question_state;
    let speed = matches!(live.entry.code, QuestionCode::Speed { .. });

    let open = match display {
        QuestionState::Showing | QuestionState::AnswerRevealed => true,
        QuestionState::Completed => question.round != RoundKind::Finish,
        QuestionState::Hidden => false,
    };
    if !open {
        return Err(ServiceError::InvalidState(
            "question is not open for decisions".into(),
        ));
    }

    let mut player = live::find_player(&store, match_id, player_id).await?;
    let mut scorable = scorable(&live, player_id).await?;
    let speed_rank = match (speed && decision.is_correct(), confirmed_rank) {
        (false, _) => 0,
        (true, Some(rank)) => rank,
        (true, None) => rank_by_response(&store.list_answers(question.id).await?, player_id),
    };

    // Claim the decision on the session first so a player is never scored twice.
    let (claimed, rank) = state
        .mutate_session(match_id, |session| {
            if session.current_question != Some(question.id) || session.question_state != display {
                return Err(ServiceError::InvalidState(
                    "question changed while deciding".into(),
                ));
            }
            if session.decided_players.contains(&player_id) {
                return Err(ServiceError::InvalidState(
                    "player already decided on this question".into(),
                ));
            }
            session.decided_players.push(player_id);
            if speed_rank > 0 {
                session.awarded_ranks += 1;
            }
            Ok(speed_rank)
        })
        .await?;

    if let RuleContext::Speed { rank: slot } = &mut scorable.context {
        *slot = rank;
    }
    let outcome = evaluate(scorable.context, decision, &state.config().scoring);

    let key = ScoreKey {
        match_id,
        player_id,
        round: question.round,
    };
    let mut write = LedgerWrite::new(key, scorable.source, outcome.delta);
    write.question_id = Some(question.id);
    let change = match apply_change(state, &store, write).await {
        Ok(change) => change,
        Err(err) => {
            release_claim(state, match_id, player_id, rank).await;
            return Err(err);
        }
    };

    let transfer = match (outcome.primary_delta, scorable.primary) {
        (Some(delta), Some(primary)) => {
            let mut write = LedgerWrite::new(
                ScoreKey {
                    match_id,
                    player_id: primary,
                    round: question.round,
                },
                ScoreChangeSource::Steal,
                delta,
            );
            write.question_id = Some(question.id);
            let debit = match apply_change(state, &store, write).await {
                Ok(debit) => debit,
                Err(err) => {
                    // the credit must not outlive a refused debit
                    match revert_change(state, &store, &change).await {
                        Ok(Some(_)) => {}
                        Ok(None) => {
                            warn!(%match_id, change_id = %change.id, "steal credit has no ledger entry to take back");
                        }
                        Err(revert_err) => {
                            warn!(%match_id, change_id = %change.id, error = %revert_err, "could not take back steal credit");
                        }
                    }
                    release_claim(state, match_id, player_id, rank).await;
                    return Err(err);
                }
            };
            Some(TransferView {
                player_id: primary,
                delta: debit.applied_delta,
                new_total: debit.points_after,
            })
        }
        _ => None,
    };

    if outcome.disqualify {
        store
            .set_player_disqualified(match_id, player_id, true)
            .await?;
        player.is_disqualified_obstacle = true;
        sse_events::broadcast_player(state, &player);
        info!(%match_id, %player_id, "player disqualified for the obstacle round");
    }

    if outcome.resolve_clue {
        mark_resolved(state, &store, &live, question.id).await?;
    }
    if outcome.reveal_all_clues {
        for clue in live.catalog.obstacle_clues() {
            if !clue.is_resolved() {
                mark_resolved(state, &store, &live, clue.question.id).await?;
            }
        }
    }

    if let (Some(star_outcome), Some(mut star)) = (outcome.star, scorable.star)
        && store.finalize_star(star.id, star_outcome).await?
    {
        star.outcome = Some(star_outcome);
        sse_events::broadcast_star(state, &star, ChangeKind::Updated);
    }

    grade_latest_answer(state, &store, question.id, player_id, decision, change.applied_delta)
        .await;

    let session = if outcome.opens_steal_window {
        insert_reset(state, &store, match_id, question.id).await?;
        let (session, ()) = state
            .mutate_session(match_id, |session| {
                let plan = state_machine::plan(session, SessionEvent::OpenStealWindow)?;
                plan.apply(session);
                session.timer_deadline = None;
                Ok(())
            })
            .await?;
        session
    } else if speed {
        claimed
    } else {
        complete(state, match_id).await?
    };

    info!(
        %match_id,
        %player_id,
        question_id = %question.id,
        ?decision,
        requested = change.requested_delta,
        applied = change.applied_delta,
        total = change.points_after,
        "decision recorded"
    );

    Ok(DecisionResponse {
        player_id,
        requested_delta: change.requested_delta,
        delta: change.applied_delta,
        new_total: change.points_after,
        question_state: session.question_state,
        transfer,
    })
}

/// Grade several players on the current question.
///
/// On a speed question correct items are ranked by the confirmed `order`, then by the
/// earliest submission, and the question completes once every item is applied.
pub async fn record_decisions_batch(
    state: &SharedState,
    match_id: Uuid,
    request: BatchDecisionRequest,
) -> Result<BatchDecisionResponse, ServiceError> {
    let BatchDecisionRequest { mut items, order } = request;

    let mut seen = HashSet::new();
    if let Some(duplicate) = items.iter().find(|item| !seen.insert(item.player_id)) {
        return Err(ServiceError::InvalidInput(format!(
            "player {} appears twice in the batch",
            duplicate.player_id
        )));
    }

    let live = live::live_question(state, match_id).await?;
    let speed = matches!(live.entry.code, QuestionCode::Speed { .. });

    if speed {
        let answers = live.store.list_answers(live.entry.question.id).await?;
        let earliest = |player_id: Uuid| {
            answers
                .iter()
                .filter(|answer| answer.player_id == player_id)
                .filter_map(|answer| answer.response_time_ms)
                .min()
                .unwrap_or(i64::MAX)
        };
        let confirmed = |player_id: Uuid| {
            order
                .as_ref()
                .and_then(|order| order.iter().position(|id| *id == player_id))
                .unwrap_or(usize::MAX)
        };
        items.sort_by_key(|item| {
            (
                !item.decision.is_correct(),
                confirmed(item.player_id),
                earliest(item.player_id),
            )
        });
    }

    let mut results = Vec::with_capacity(items.len());
    let mut next_rank = live.session.awarded_ranks;
    for item in items {
        let confirmed_rank = match (&order, speed && item.decision.is_correct()) {
            (Some(_), true) => {
                next_rank += 1;
                Some(next_rank)
            }
            _ => None,
        };
        results.push(decide(state, match_id, item.player_id, item.decision, confirmed_rank).await?);
    }

    if speed {
        let session = complete(state, match_id).await?;
        for result in &mut results {
            result.question_state = session.question_state;
        }
    }

    info!(%match_id, decisions = results.len(), "decision batch recorded");
    Ok(BatchDecisionResponse { results })
}

/// Relative manual correction with a mandatory reason.
pub async fn manual_adjust(
    state: &SharedState,
    match_id: Uuid,
    request: ManualAdjustRequest,
) -> Result<ScoreUpdateResponse, ServiceError> {
    let reason = require_reason(state, request.reason.as_deref())?;
    let store = state.require_store().await?;
    live::find_player(&store, match_id, request.player_id).await?;

    let mut write = LedgerWrite::new(
        ScoreKey {
            match_id,
            player_id: request.player_id,
            round: request.round,
        },
        ScoreChangeSource::Manual,
        request.delta,
    );
    write.reason = Some(reason);
    let change = apply_change(state, &store, write).await?;

    info!(
        %match_id,
        player_id = %request.player_id,
        round = request.round.as_str(),
        applied = change.applied_delta,
        "manual score adjustment"
    );
    Ok(update_response(&change))
}

/// Absolute override of a round total, logged as the equivalent delta.
pub async fn set_total(
    state: &SharedState,
    match_id: Uuid,
    request: SetTotalRequest,
) -> Result<ScoreUpdateResponse, ServiceError> {
    let reason = require_reason(state, request.reason.as_deref())?;
    if request.total < 0 {
        return Err(ServiceError::InvalidInput("total cannot be negative".into()));
    }
    let store = state.require_store().await?;
    live::find_player(&store, match_id, request.player_id).await?;

    let current = store
        .list_scores(match_id)
        .await?
        .into_iter()
        .find(|score| score.player_id == request.player_id && score.round == request.round)
        .map(|score| score.points)
        .unwrap_or(0);

    let mut write = LedgerWrite::new(
        ScoreKey {
            match_id,
            player_id: request.player_id,
            round: request.round,
        },
        ScoreChangeSource::SetTotal,
        request.total - current,
    );
    write.reason = Some(reason);
    let change = apply_change(state, &store, write).await?;

    info!(
        %match_id,
        player_id = %request.player_id,
        round = request.round.as_str(),
        total = change.points_after,
        "score total set"
    );
    Ok(update_response(&change))
}

/// Revert the most recent ledger change that is neither a reversal nor reverted.
pub async fn undo_last(state: &SharedState, match_id: Uuid) -> Result<UndoResponse, ServiceError> {
    let store = state.require_store().await?;

    for attempt in 1..=MAX_UNDO_ATTEMPTS {
        let changes = store.list_score_changes(match_id).await?;
        let Some(original) = changes
            .into_iter()
            .rev()
            .find(|change| change.source != ScoreChangeSource::Revert && change.reverted_by.is_none())
        else {
            return Err(ServiceError::InvalidState("nothing to undo".into()));
        };

        let Some(change) = revert_change(state, &store, &original).await? else {
            debug!(%match_id, change_id = %original.id, attempt, "change reverted concurrently; retrying undo");
            continue;
        };
        let revert_id = change.id;

        forget_decision(state, match_id, &original).await;

        info!(
            %match_id,
            reverted = %original.id,
            %revert_id,
            player_id = %original.player_id,
            applied = change.applied_delta,
            "score change undone"
        );
        return Ok(UndoResponse {
            reverted: original.id,
            revert_id,
            player_id: original.player_id,
            round: original.round,
            applied_delta: change.applied_delta,
            points_after: change.points_after,
        });
    }

    Err(ServiceError::Contention)
}

/// Bring every ledger row of the match back to zero.
pub async fn reset_scores(
    state: &SharedState,
    match_id: Uuid,
) -> Result<ResetScoresResponse, ServiceError> {
    let store = state.require_store().await?;
    let mut cleared_rows = 0;

    for score in store.list_scores(match_id).await? {
        if score.points == 0 {
            continue;
        }
        let mut write = LedgerWrite::new(
            ScoreKey {
                match_id,
                player_id: score.player_id,
                round: score.round,
            },
            ScoreChangeSource::Reset,
            -score.points,
        );
        write.reason = Some("score reset".into());
        apply_change(state, &store, write).await?;
        cleared_rows += 1;
    }

    info!(%match_id, cleared_rows, "scores reset");
    Ok(ResetScoresResponse { cleared_rows })
}

/// Per-round points of every seat, in seat order.
pub async fn scoreboard(
    state: &SharedState,
    match_id: Uuid,
) -> Result<Vec<ScoreboardRow>, ServiceError> {
    let store = state.require_store().await?;
    let mut players = store.list_players(match_id).await?;
    players.sort_by_key(|player| player.seat);

    let mut rows: IndexMap<Uuid, ScoreboardRow> = players
        .into_iter()
        .map(|player| {
            (
                player.id,
                ScoreboardRow {
                    player_id: player.id,
                    seat: player.seat,
                    display_name: player.display_name,
                    ..Default::default()
                },
            )
        })
        .collect();

    for score in store.list_scores(match_id).await? {
        if let Some(row) = rows.get_mut(&score.player_id) {
            row.set_round(score.round, score.points);
        }
    }

    Ok(rows.into_values().collect())
}

/// Audit trail, newest first. A missing trail reads as empty history.
pub async fn history(
    state: &SharedState,
    match_id: Uuid,
) -> Result<Vec<ScoreChangeView>, ServiceError> {
    let store = state.require_store().await?;
    match store.list_score_changes(match_id).await {
        Ok(changes) => Ok(changes.iter().rev().map(ScoreChangeView::from).collect()),
        Err(err) => {
            warn!(%match_id, error = %err, "score history unavailable");
            Ok(Vec::new())
        }
    }
}

/// Apply a clamped delta and record it. Only the ledger write can fail the call.
async fn apply_change(
    state: &SharedState,
    store: &Arc<dyn LiveStore>,
    write: LedgerWrite,
) -> Result<ScoreChangeEntity, ServiceError> {
    let (before, after) = store.apply_score_delta(write.key, write.requested).await?;

    let change = ScoreChangeEntity {
        id: write.id,
        match_id: write.key.match_id,
        player_id: write.key.player_id,
        round: write.key.round,
        question_id: write.question_id,
        source: write.source,
        requested_delta: write.requested,
        applied_delta: after - before,
        points_before: before,
        points_after: after,
        reason: write.reason,
        revert_of: write.revert_of,
        reverted_by: None,
        created_at: now_ms(),
    };

    if let Err(err) = store.append_score_change(change.clone()).await {
        warn!(
            match_id = %change.match_id,
            player_id = %change.player_id,
            change_id = %change.id,
            error = %err,
            "score change applied without audit entry"
        );
    }
    sse_events::broadcast_score_change(state, &change);
    Ok(change)
}

/// Mark `original` reverted and apply its inverse. The mark is dropped again when the
/// ledger refuses the inverse; `None` means someone else reverted it first.
async fn revert_change(
    state: &SharedState,
    store: &Arc<dyn LiveStore>,
    original: &ScoreChangeEntity,
) -> Result<Option<ScoreChangeEntity>, ServiceError> {
    let revert_id = Uuid::new_v4();
    if !store
        .mark_score_change_reverted(original.id, revert_id)
        .await?
    {
        return Ok(None);
    }

    let mut write = LedgerWrite::new(
        ScoreKey {
            match_id: original.match_id,
            player_id: original.player_id,
            round: original.round,
        },
        ScoreChangeSource::Revert,
        -original.applied_delta,
    );
    write.id = revert_id;
    write.question_id = original.question_id;
    write.revert_of = Some(original.id);

    match apply_change(state, store, write).await {
        Ok(change) => Ok(Some(change)),
        Err(err) => {
            if let Err(clear_err) = store
                .clear_score_change_revert(original.id, revert_id)
                .await
            {
                warn!(
                    change_id = %original.id,
                    error = %clear_err,
                    "revert mark left on a change whose reversal failed"
                );
            }
            Err(err)
        }
    }
}

/// Finishing position among the correct answers of a speed question, earliest first.
/// Answers without a response time rank last; ties fall back to the player id.
fn rank_by_response(answers: &[AnswerEntity], player_id: Uuid) -> u32 {
    let earliest = |id: Uuid| {
        answers
            .iter()
            .filter(|answer| answer.player_id == id)
            .filter_map(|answer| answer.response_time_ms)
            .min()
            .unwrap_or(i64::MAX)
    };
    let graded_correct = |id: Uuid| {
        answers
            .iter()
            .rev()
            .find(|answer| answer.player_id == id)
            .is_some_and(|answer| answer.is_correct == Some(true))
    };

    let own = (earliest(player_id), player_id);
    let ahead: HashSet<Uuid> = answers
        .iter()
        .map(|answer| answer.player_id)
        .filter(|id| *id != player_id && graded_correct(*id) && (earliest(*id), *id) < own)
        .collect();
    u32::try_from(ahead.len()).unwrap_or(u32::MAX).saturating_add(1)
}

/// Resolve the rule row of the decided player, enforcing who may be scored.
async fn scorable(live: &LiveQuestion, player_id: Uuid) -> Result<Scorable, ServiceError> {
    let question = &live.entry.question;
    let is_target = question.target_player == Some(player_id);
    let targeted = |context| {
        if is_target {
            Ok(Scorable::plain(context))
        } else {
            Err(ServiceError::InvalidState(TARGET_MISMATCH.into()))
        }
    };

    match live.entry.code {
        QuestionCode::OpeningPersonal { .. } => targeted(RuleContext::OpeningPersonal),
        QuestionCode::OpeningCommon { .. } => targeted(RuleContext::OpeningCommon),
        QuestionCode::ObstacleClue { .. } => targeted(RuleContext::ObstacleClue),
        QuestionCode::ObstacleKeyword => {
            let resolved_clues = live
                .catalog
                .obstacle_clues()
                .iter()
                .filter(|clue| clue.is_resolved())
                .count();
            targeted(RuleContext::ObstacleKeyword { resolved_clues })
        }
        QuestionCode::Speed { .. } => Ok(Scorable::plain(RuleContext::Speed { rank: 0 })),
        QuestionCode::FinishSlot { .. } => {
            let value = question
                .value
                .map(i32::from)
                .ok_or_else(|| ServiceError::InvalidState("no package selected for this slot".into()))?;
            let stars = live.store.list_stars(question.match_id).await?;

            if live.session.question_state == QuestionState::AnswerRevealed {
                let stole = epoch_winner(&live.store, question.id)
                    .await?
                    .is_some_and(|winner| {
                        winner.event_type == BuzzKind::Steal && winner.player_id == Some(player_id)
                    });
                if !stole {
                    return Err(ServiceError::InvalidState(TARGET_MISMATCH.into()));
                }
                let primary = question.target_player;
                let primary_starred = stars
                    .iter()
                    .any(|star| Some(star.player_id) == primary && star.question_id == question.id);
                Ok(Scorable {
                    context: RuleContext::FinishSteal {
                        value,
                        primary_starred,
                    },
                    source: ScoreChangeSource::Steal,
                    star: None,
                    primary,
                })
            } else {
                if !is_target {
                    return Err(ServiceError::InvalidState(TARGET_MISMATCH.into()));
                }
                let star = stars.into_iter().find(|star| {
                    star.player_id == player_id
                        && star.question_id == question.id
                        && star.outcome.is_none()
                });
                Ok(Scorable {
                    context: RuleContext::FinishPrimary {
                        value,
                        star: star.is_some(),
                    },
                    source: ScoreChangeSource::Decision,
                    star,
                    primary: None,
                })
            }
        }
        QuestionCode::FinishPool { .. } => Err(ServiceError::InvalidState(
            "pool items cannot be scored directly".into(),
        )),
    }
}

async fn complete(
    state: &SharedState,
    match_id: Uuid,
) -> Result<SessionEntity, ServiceError> {
    let (session, ()) = state
        .mutate_session(match_id, |session| {
            let plan = state_machine::plan(session, SessionEvent::Complete)?;
            plan.apply(session);
            session.timer_deadline = None;
            Ok(())
        })
        .await?;
    Ok(session)
}

async fn mark_resolved(
    state: &SharedState,
    store: &Arc<dyn LiveStore>,
    live: &LiveQuestion,
    question_id: Uuid,
) -> Result<(), ServiceError> {
    let Some(entry) = live.catalog.get(question_id) else {
        return Ok(());
    };
    let mut question = entry.question.clone();
    question.meta.insert(META_RESOLVED.into(), Value::Bool(true));
    persist_question(state, store, question).await
}

/// Copy the verdict onto the player's latest submission, if any.
async fn grade_latest_answer(
    state: &SharedState,
    store: &Arc<dyn LiveStore>,
    question_id: Uuid,
    player_id: Uuid,
    decision: Decision,
    points: i32,
) {
    let answers = match store.list_answers(question_id).await {
        Ok(answers) => answers,
        Err(err) => {
            warn!(%question_id, %player_id, error = %err, "could not load answers to grade");
            return;
        }
    };
    let Some(mut answer) = answers
        .into_iter()
        .rev()
        .find(|answer| answer.player_id == player_id)
    else {
        return;
    };

    answer.is_correct = Some(decision.is_correct());
    answer.points_awarded = Some(points);
    match store.save_answer(answer.clone()).await {
        Ok(()) => sse_events::broadcast_answer(state, &answer, ChangeKind::Updated),
        Err(err) => warn!(%question_id, %player_id, error = %err, "could not grade answer"),
    }
}

/// Give the decision slot back after the ledger refused the write.
async fn release_claim(state: &SharedState, match_id: Uuid, player_id: Uuid, rank: u32) {
    let released = state
        .mutate_session(match_id, |session| {
            session.decided_players.retain(|id| *id != player_id);
            if rank > 0 {
                session.awarded_ranks = session.awarded_ranks.saturating_sub(1);
            }
            Ok(())
        })
        .await;
    if let Err(err) = released {
        warn!(%match_id, %player_id, error = %err, "could not release decision claim");
    }
}

/// After undoing a decision on the current question, let the player be decided again.
async fn forget_decision(state: &SharedState, match_id: Uuid, original: &ScoreChangeEntity) {
    let decided_here = match original.source {
        ScoreChangeSource::Decision => true,
        // A steal transfer debits the primary, whose own decision stands.
        ScoreChangeSource::Steal => match (original.question_id, state.catalog(match_id).await) {
            (Some(question_id), Ok(catalog)) => catalog
                .get(question_id)
                .is_some_and(|entry| entry.question.target_player != Some(original.player_id)),
            _ => false,
        },
        _ => false,
    };
    if !decided_here {
        return;
    }

    let speed_award = original.round == RoundKind::Speed && original.applied_delta > 0;
    let forgotten = state
        .mutate_session(match_id, |session| {
            if session.current_question.is_none() || session.current_question != original.question_id {
                return Ok(());
            }
            session.decided_players.retain(|id| *id != original.player_id);
            if speed_award {
                session.awarded_ranks = session.awarded_ranks.saturating_sub(1);
            }
            Ok(())
        })
        .await;
    if let Err(err) = forgotten {
        warn!(%match_id, change_id = %original.id, error = %err, "could not reopen decision after undo");
    }
}

fn require_reason(state: &SharedState, reason: Option<&str>) -> Result<String, ServiceError> {
    let min = state.config().min_reason_len;
    let reason = reason.map(str::trim).unwrap_or_default();
    if reason.chars().count() < min {
        return Err(ServiceError::InvalidInput(format!(
            "a reason of at least {min} characters is required"
        )));
    }
    Ok(reason.to_string())
}

fn update_response(change: &ScoreChangeEntity) -> ScoreUpdateResponse {
    ScoreUpdateResponse {
        change_id: change.id,
        player_id: change.player_id,
        round: change.round,
        requested_delta: change.requested_delta,
        applied_delta: change.applied_delta,
        points_before: change.points_before,
        points_after: change.points_after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::StarOutcome,
        dto::{moderator::DecisionItem, play::SignalKind},
        services::{
            answer_service, buzzer_service, finish_service, navigation_service,
            presentation_service, session_service,
            test_support::{Fixture, seat},
        },
    };

    async fn show(fixture: &Fixture, code: &str) -> Uuid {
        let question_id = fixture.question_id(code).await;
        navigation_service::select_question(&fixture.state, fixture.match_id, question_id, true)
            .await
            .unwrap();
        presentation_service::toggle_buzzer(&fixture.state, fixture.match_id, true)
            .await
            .unwrap();
        question_id
    }

    async fn seed(fixture: &Fixture, player_id: Uuid, round: RoundKind, total: i32) {
        set_total(
            &fixture.state,
            fixture.match_id,
            SetTotalRequest {
                player_id,
                round,
                total,
                reason: Some("seed points".into()),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn only_the_buzz_winner_is_scorable() {
        let fixture = Fixture::running().await;
        let question_id = show(&fixture, "DKA-1").await;
        let first = seat(&fixture, 1);
        let second = seat(&fixture, 2);

        assert!(buzzer_service::signal(&fixture.state, fixture.match_id, first, SignalKind::Buzz)
            .await
            .unwrap()
            .won);
        let late = buzzer_service::signal(&fixture.state, fixture.match_id, second, SignalKind::Buzz)
            .await
            .unwrap();
        assert!(!late.won);
        let log = buzzer_service::buzzer_state(&fixture.state, fixture.match_id, question_id)
            .await
            .unwrap();
        assert_eq!(log.events.len(), 2);
        assert_eq!(log.winner.and_then(|w| w.player_id), Some(first));

        let err = record_decision(&fixture.state, fixture.match_id, second, Decision::Correct)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(reason) if reason == TARGET_MISMATCH));

        let response = record_decision(&fixture.state, fixture.match_id, first, Decision::Correct)
            .await
            .unwrap();
        assert_eq!(response.delta, 10);
        assert_eq!(response.question_state, QuestionState::Completed);
        assert_eq!(fixture.points(first, RoundKind::Opening).await, 10);
    }

    #[tokio::test]
    async fn penalties_never_take_a_total_below_zero() {
        let fixture = Fixture::running().await;
        show(&fixture, "DKA-2").await;
        let player = seat(&fixture, 3);
        buzzer_service::signal(&fixture.state, fixture.match_id, player, SignalKind::Buzz)
            .await
            .unwrap();

        let response = record_decision(&fixture.state, fixture.match_id, player, Decision::Wrong)
            .await
            .unwrap();
        assert_eq!(response.requested_delta, -5);
        assert_eq!(response.delta, 0);
        assert_eq!(response.new_total, 0);

        let err = record_decision(&fixture.state, fixture.match_id, player, Decision::Wrong)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn undo_restores_the_pre_decision_total() {
        let fixture = Fixture::running().await;
        let player = seat(&fixture, 1);
        seed(&fixture, player, RoundKind::Opening, 25).await;
        show(&fixture, "KD1-1").await;

        record_decision(&fixture.state, fixture.match_id, player, Decision::Correct)
            .await
            .unwrap();
        assert_eq!(fixture.points(player, RoundKind::Opening).await, 35);

        let undo = undo_last(&fixture.state, fixture.match_id).await.unwrap();
        assert_eq!(undo.applied_delta, -10);
        assert_eq!(fixture.points(player, RoundKind::Opening).await, 25);

        let changes = fixture
            .store
            .list_score_changes(fixture.match_id)
            .await
            .unwrap();
        assert_eq!(changes.iter().filter(|c| c.reverted_by.is_some()).count(), 1);
        let revert = changes.last().unwrap();
        assert_eq!(revert.source, ScoreChangeSource::Revert);
        assert_eq!(revert.revert_of, Some(undo.reverted));

        // The decision slot is open again.
        let session = fixture.state.session(fixture.match_id).await.unwrap();
        assert!(!session.decided_players.contains(&player));

        // The second undo reaches the seed, never the reversal.
        let seed_undo = undo_last(&fixture.state, fixture.match_id).await.unwrap();
        assert_ne!(seed_undo.reverted, undo.revert_id);
        assert_eq!(fixture.points(player, RoundKind::Opening).await, 0);
    }

    #[tokio::test]
    async fn refused_reversal_keeps_the_change_undoable() {
        let fixture = Fixture::running().await;
        let player = seat(&fixture, 1);
        seed(&fixture, player, RoundKind::Opening, 25).await;

        fixture.store.set_ledger_offline(player, true);
        assert!(undo_last(&fixture.state, fixture.match_id).await.is_err());
        assert_eq!(fixture.points(player, RoundKind::Opening).await, 25);
        let changes = fixture
            .store
            .list_score_changes(fixture.match_id)
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert!(changes[0].reverted_by.is_none());

        fixture.store.set_ledger_offline(player, false);
        let undo = undo_last(&fixture.state, fixture.match_id).await.unwrap();
        assert_eq!(undo.reverted, changes[0].id);
        assert_eq!(fixture.points(player, RoundKind::Opening).await, 0);
    }

    #[tokio::test]
    async fn set_total_logs_the_equivalent_delta_and_needs_a_reason() {
        let fixture = Fixture::running().await;
        let player = seat(&fixture, 2);
        seed(&fixture, player, RoundKind::Speed, 35).await;
        let entries_before = history(&fixture.state, fixture.match_id).await.unwrap().len();

        let err = set_total(
            &fixture.state,
            fixture.match_id,
            SetTotalRequest {
                player_id: player,
                round: RoundKind::Speed,
                total: 20,
                reason: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(fixture.points(player, RoundKind::Speed).await, 35);
        assert_eq!(
            history(&fixture.state, fixture.match_id).await.unwrap().len(),
            entries_before
        );

        let update = set_total(
            &fixture.state,
            fixture.match_id,
            SetTotalRequest {
                player_id: player,
                round: RoundKind::Speed,
                total: 20,
                reason: Some("scorer typo".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(update.requested_delta, -15);
        assert_eq!(update.applied_delta, -15);

        let latest = history(&fixture.state, fixture.match_id).await.unwrap();
        assert_eq!(latest[0].reason.as_deref(), Some("scorer typo"));
        assert_eq!(latest[0].source, ScoreChangeSource::SetTotal);
    }

    #[tokio::test]
    async fn manual_adjust_rejects_short_reasons() {
        let fixture = Fixture::running().await;
        let err = manual_adjust(
            &fixture.state,
            fixture.match_id,
            ManualAdjustRequest {
                player_id: seat(&fixture, 1),
                round: RoundKind::Opening,
                delta: 5,
                reason: Some(" ok ".into()),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn keyword_guess_scores_by_resolved_clues_and_reveals_the_rest() {
        let fixture = Fixture::running().await;
        for code in ["VCNV-1", "VCNV-2"] {
            let clue = fixture.question_id(code).await;
            navigation_service::resolve_obstacle_clue(&fixture.state, fixture.match_id, clue)
                .await
                .unwrap();
        }

        show(&fixture, "CNV").await;
        let player = seat(&fixture, 4);
        buzzer_service::signal(&fixture.state, fixture.match_id, player, SignalKind::Buzz)
            .await
            .unwrap();

        let response = record_decision(&fixture.state, fixture.match_id, player, Decision::Correct)
            .await
            .unwrap();
        assert_eq!(response.delta, 40);

        let catalog = fixture.state.catalog(fixture.match_id).await.unwrap();
        assert!(catalog.obstacle_clues().iter().all(|clue| clue.is_resolved()));
    }

    #[tokio::test]
    async fn obstacle_disqualification_holds_until_session_reset() {
        let fixture = Fixture::running().await;
        let player = seat(&fixture, 2);
        show(&fixture, "VCNV-1").await;
        buzzer_service::signal(&fixture.state, fixture.match_id, player, SignalKind::Buzz)
            .await
            .unwrap();
        record_decision(&fixture.state, fixture.match_id, player, Decision::Wrong)
            .await
            .unwrap();

        show(&fixture, "VCNV-2").await;
        assert!(buzzer_service::signal(&fixture.state, fixture.match_id, player, SignalKind::Buzz)
            .await
            .is_err());
        assert!(answer_service::submit(&fixture.state, fixture.match_id, player, "green")
            .await
            .is_err());

        session_service::reset_session_state(&fixture.state, fixture.match_id)
            .await
            .unwrap();
        show(&fixture, "VCNV-3").await;
        assert!(buzzer_service::signal(&fixture.state, fixture.match_id, player, SignalKind::Buzz)
            .await
            .unwrap()
            .won);
    }

    #[tokio::test]
    async fn speed_batch_ranks_by_response_time() {
        let fixture = Fixture::running().await;
        let question_id = show(&fixture, "TT-1").await;
        let (fast, slow, wrong) = (seat(&fixture, 3), seat(&fixture, 1), seat(&fixture, 2));

        answer_service::submit(&fixture.state, fixture.match_id, fast, "Ha Noi")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        answer_service::submit(&fixture.state, fixture.match_id, slow, "hà nội")
            .await
            .unwrap();
        answer_service::submit(&fixture.state, fixture.match_id, wrong, "Hue")
            .await
            .unwrap();

        let batch = record_decisions_batch(
            &fixture.state,
            fixture.match_id,
            BatchDecisionRequest {
                items: vec![
                    DecisionItem {
                        player_id: wrong,
                        decision: Decision::Wrong,
                    },
                    DecisionItem {
                        player_id: slow,
                        decision: Decision::Correct,
                    },
                    DecisionItem {
                        player_id: fast,
                        decision: Decision::Correct,
                    },
                ],
                order: None,
            },
        )
        .await
        .unwrap();

        let awards: Vec<(Uuid, i32)> = batch.results.iter().map(|r| (r.player_id, r.delta)).collect();
        assert_eq!(awards, vec![(fast, 40), (slow, 30), (wrong, 0)]);
        assert!(batch
            .results
            .iter()
            .all(|r| r.question_state == QuestionState::Completed));

        let answers = answer_service::list_answers(&fixture.state, fixture.match_id, question_id)
            .await
            .unwrap();
        let fast_answer = answers.iter().find(|a| a.player_id == fast).unwrap();
        assert_eq!(fast_answer.points_awarded, Some(40));
    }

    #[tokio::test]
    async fn starred_finish_question_doubles_or_costs() {
        let fixture = Fixture::running().await;
        let (lucky, unlucky) = (seat(&fixture, 1), seat(&fixture, 2));
        seed(&fixture, unlucky, RoundKind::Finish, 50).await;

        for player in [lucky, unlucky] {
            finish_service::select_package(&fixture.state, fixture.match_id, player, vec![30, 20, 20])
                .await
                .unwrap();
        }

        let lucky_slot = fixture.question_id("VD1-1").await;
        finish_service::declare_star(&fixture.state, fixture.match_id, lucky, lucky_slot)
            .await
            .unwrap();
        show(&fixture, "VD1-1").await;
        let won = record_decision(&fixture.state, fixture.match_id, lucky, Decision::Correct)
            .await
            .unwrap();
        assert_eq!(won.delta, 60);
        assert_eq!(won.question_state, QuestionState::Completed);

        let unlucky_slot = fixture.question_id("VD2-1").await;
        finish_service::declare_star(&fixture.state, fixture.match_id, unlucky, unlucky_slot)
            .await
            .unwrap();
        show(&fixture, "VD2-1").await;
        let lost = record_decision(&fixture.state, fixture.match_id, unlucky, Decision::Wrong)
            .await
            .unwrap();
        assert_eq!(lost.requested_delta, -30);
        assert_eq!(lost.delta, -30);
        assert_eq!(lost.question_state, QuestionState::AnswerRevealed);

        let stars = fixture.store.list_stars(fixture.match_id).await.unwrap();
        let outcome = |player| stars.iter().find(|s| s.player_id == player).and_then(|s| s.outcome);
        assert_eq!(outcome(lucky), Some(StarOutcome::Applied));
        assert_eq!(outcome(unlucky), Some(StarOutcome::Wasted));
    }

    #[tokio::test]
    async fn successful_steal_transfers_from_the_primary() {
        let fixture = Fixture::running().await;
        let (primary, thief) = (seat(&fixture, 1), seat(&fixture, 3));
        seed(&fixture, primary, RoundKind::Finish, 50).await;
        finish_service::select_package(&fixture.state, fixture.match_id, primary, vec![30, 30, 30])
            .await
            .unwrap();
        show(&fixture, "VD1-2").await;

        let missed = record_decision(&fixture.state, fixture.match_id, primary, Decision::Timeout)
            .await
            .unwrap();
        assert_eq!(missed.question_state, QuestionState::AnswerRevealed);

        // The primary cannot take the steal window for themselves.
        assert!(buzzer_service::signal(&fixture.state, fixture.match_id, primary, SignalKind::Steal)
            .await
            .is_err());
        assert!(buzzer_service::signal(&fixture.state, fixture.match_id, thief, SignalKind::Steal)
            .await
            .unwrap()
            .won);
        answer_service::submit(&fixture.state, fixture.match_id, thief, "answer")
            .await
            .unwrap();
        assert!(answer_service::submit(&fixture.state, fixture.match_id, thief, "again")
            .await
            .is_err());

        let stolen = record_decision(&fixture.state, fixture.match_id, thief, Decision::Correct)
            .await
            .unwrap();
        assert_eq!(stolen.delta, 30);
        let transfer = stolen.transfer.unwrap();
        assert_eq!(transfer.player_id, primary);
        assert_eq!(transfer.delta, -30);
        assert_eq!(transfer.new_total, 20);
        assert_eq!(stolen.question_state, QuestionState::Completed);
    }

    #[tokio::test]
    async fn refused_steal_debit_takes_back_the_credit() {
        let fixture = Fixture::running().await;
        let (primary, thief) = (seat(&fixture, 2), seat(&fixture, 4));
        seed(&fixture, primary, RoundKind::Finish, 50).await;
        finish_service::select_package(&fixture.state, fixture.match_id, primary, vec![20, 20, 20])
            .await
            .unwrap();
        show(&fixture, "VD2-1").await;
        record_decision(&fixture.state, fixture.match_id, primary, Decision::Wrong)
            .await
            .unwrap();
        assert!(buzzer_service::signal(&fixture.state, fixture.match_id, thief, SignalKind::Steal)
            .await
            .unwrap()
            .won);

        fixture.store.set_ledger_offline(primary, true);
        assert!(record_decision(&fixture.state, fixture.match_id, thief, Decision::Correct)
            .await
            .is_err());
        assert_eq!(fixture.points(thief, RoundKind::Finish).await, 0);
        assert_eq!(fixture.points(primary, RoundKind::Finish).await, 50);
        let session = fixture.state.session(fixture.match_id).await.unwrap();
        assert!(!session.decided_players.contains(&thief));

        fixture.store.set_ledger_offline(primary, false);
        let stolen = record_decision(&fixture.state, fixture.match_id, thief, Decision::Correct)
            .await
            .unwrap();
        assert_eq!(stolen.new_total, 20);
        assert_eq!(stolen.transfer.unwrap().new_total, 30);
    }

    #[tokio::test]
    async fn single_speed_decisions_rank_by_response_time() {
        let fixture = Fixture::running().await;
        show(&fixture, "TT-1").await;
        let (fast, slow) = (seat(&fixture, 2), seat(&fixture, 4));

        answer_service::submit(&fixture.state, fixture.match_id, fast, "ha noi")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        answer_service::submit(&fixture.state, fixture.match_id, slow, "Hà Nội")
            .await
            .unwrap();

        let late_call = record_decision(&fixture.state, fixture.match_id, slow, Decision::Correct)
            .await
            .unwrap();
        let early_call = record_decision(&fixture.state, fixture.match_id, fast, Decision::Correct)
            .await
            .unwrap();
        assert_eq!(late_call.delta, 30);
        assert_eq!(early_call.delta, 40);
    }

    #[tokio::test]
    async fn missing_audit_trail_does_not_fail_the_decision() {
        let fixture = Fixture::running().await;
        let player = seat(&fixture, 2);
        show(&fixture, "KD2-1").await;
        fixture.store.set_audit_offline(true);

        let response = record_decision(&fixture.state, fixture.match_id, player, Decision::Correct)
            .await
            .unwrap();
        assert_eq!(response.new_total, 10);
        assert_eq!(fixture.points(player, RoundKind::Opening).await, 10);
        assert!(history(&fixture.state, fixture.match_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scoreboard_totals_rounds_in_seat_order() {
        let fixture = Fixture::running().await;
        seed(&fixture, seat(&fixture, 2), RoundKind::Opening, 10).await;
        seed(&fixture, seat(&fixture, 2), RoundKind::Finish, 30).await;

        let board = scoreboard(&fixture.state, fixture.match_id).await.unwrap();
        assert_eq!(board.iter().map(|row| row.seat).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(board[1].total, 40);
        assert_eq!(board[0].total, 0);

        let reset = reset_scores(&fixture.state, fixture.match_id).await.unwrap();
        assert_eq!(reset.cleared_rows, 2);
        let board = scoreboard(&fixture.state, fixture.match_id).await.unwrap();
        assert!(board.iter().all(|row| row.total == 0));
    }
}
