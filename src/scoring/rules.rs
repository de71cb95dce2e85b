//! Per-round point rules as pure functions of the decision and question context.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{config::ScoringRules, dao::models::StarOutcome};

/// Moderator verdict on a player's answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Accepted answer.
    Correct,
    /// Rejected answer.
    Wrong,
    /// No answer before the deadline.
    Timeout,
}

impl Decision {
    /// Whether the verdict awards points.
    pub fn is_correct(self) -> bool {
        self == Decision::Correct
    }
}

/// Scoring situation of the decided player, one variant per rule row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleContext {
    /// Opening question addressed to the player's seat.
    OpeningPersonal,
    /// Opening common-pool question won on the buzzer.
    OpeningCommon,
    /// Obstacle sub-clue.
    ObstacleClue,
    /// Obstacle keyword guess.
    ObstacleKeyword {
        /// Sub-clues opened before the guess.
        resolved_clues: usize,
    },
    /// Speed-round answer.
    Speed {
        /// 1-based rank among correct answers.
        rank: u32,
    },
    /// Finish-round question of the player's own package.
    FinishPrimary {
        /// Question value.
        value: i32,
        /// The player declared their star on this question.
        star: bool,
    },
    /// Finish-round steal on another player's question.
    FinishSteal {
        /// Question value.
        value: i32,
        /// The package owner declared a star on the question.
        primary_starred: bool,
    },
}

/// Effects of a decision. Point deltas are requested values; the ledger applies the floor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleOutcome {
    /// Points for the decided player.
    pub delta: i32,
    /// Points taken from the primary player on a successful steal.
    pub primary_delta: Option<i32>,
    /// Exclude the player from the rest of the obstacle round.
    pub disqualify: bool,
    /// Mark the current sub-clue as opened.
    pub resolve_clue: bool,
    /// The keyword was found; open every clue.
    pub reveal_all_clues: bool,
    /// Final outcome of a declared star.
    pub star: Option<StarOutcome>,
    /// Other players may now steal the question.
    pub opens_steal_window: bool,
}

/// Evaluate the rule row of `context` for `decision`.
pub fn evaluate(context: RuleContext, decision: Decision, rules: &ScoringRules) -> RuleOutcome {
    let correct = decision.is_correct();

    match context {
        RuleContext::OpeningPersonal => RuleOutcome {
            delta: if correct { rules.opening_correct } else { 0 },
            ..Default::default()
        },
        RuleContext::OpeningCommon => RuleOutcome {
            delta: if correct {
                rules.opening_correct
            } else {
                -rules.opening_common_penalty
            },
            ..Default::default()
        },
        RuleContext::ObstacleClue => RuleOutcome {
            delta: if correct { rules.obstacle_clue_points } else { 0 },
            resolve_clue: correct,
            disqualify: !correct,
            ..Default::default()
        },
        RuleContext::ObstacleKeyword { resolved_clues } => {
            if correct {
                let resolved = i32::try_from(resolved_clues).unwrap_or(i32::MAX);
                let points = rules
                    .obstacle_keyword_base
                    .saturating_sub(rules.obstacle_keyword_step.saturating_mul(resolved))
                    .max(0);
                RuleOutcome {
                    delta: points,
                    reveal_all_clues: true,
                    ..Default::default()
                }
            } else {
                RuleOutcome {
                    disqualify: true,
                    ..Default::default()
                }
            }
        }
        RuleContext::Speed { rank } => {
            let award = rank
                .checked_sub(1)
                .and_then(|index| rules.speed_awards.get(index as usize))
                .copied()
                .unwrap_or(0);
            RuleOutcome {
                delta: if correct { award } else { 0 },
                ..Default::default()
            }
        }
        RuleContext::FinishPrimary { value, star } => match (correct, star) {
            (true, true) => RuleOutcome {
                delta: value * 2,
                star: Some(StarOutcome::Applied),
                ..Default::default()
            },
            (true, false) => RuleOutcome {
                delta: value,
                ..Default::default()
            },
            (false, true) => RuleOutcome {
                delta: -value,
                star: Some(StarOutcome::Wasted),
                opens_steal_window: true,
                ..Default::default()
            },
            (false, false) => RuleOutcome {
                opens_steal_window: true,
                ..Default::default()
            },
        },
        RuleContext::FinishSteal {
            value,
            primary_starred,
        } => {
            if correct {
                RuleOutcome {
                    delta: value,
                    primary_delta: (!primary_starred).then_some(-value),
                    ..Default::default()
                }
            } else {
                RuleOutcome {
                    delta: -(value / rules.steal_penalty_divisor),
                    ..Default::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ScoringRules {
        ScoringRules::default()
    }

    #[test]
    fn opening_rows() {
        let r = rules();
        assert_eq!(evaluate(RuleContext::OpeningPersonal, Decision::Correct, &r).delta, 10);
        assert_eq!(evaluate(RuleContext::OpeningPersonal, Decision::Wrong, &r).delta, 0);
        assert_eq!(evaluate(RuleContext::OpeningCommon, Decision::Correct, &r).delta, 10);
        assert_eq!(evaluate(RuleContext::OpeningCommon, Decision::Timeout, &r).delta, -5);
    }

    #[test]
    fn obstacle_clue_wrong_disqualifies() {
        let outcome = evaluate(RuleContext::ObstacleClue, Decision::Wrong, &rules());
        assert_eq!(outcome.delta, 0);
        assert!(outcome.disqualify);
        assert!(!outcome.resolve_clue);
    }

    #[test]
    fn keyword_award_drops_per_resolved_clue() {
        let outcome = evaluate(
            RuleContext::ObstacleKeyword { resolved_clues: 2 },
            Decision::Correct,
            &rules(),
        );
        assert_eq!(outcome.delta, 40);
        assert!(outcome.reveal_all_clues);

        let wrong = evaluate(
            RuleContext::ObstacleKeyword { resolved_clues: 2 },
            Decision::Wrong,
            &rules(),
        );
        assert!(wrong.disqualify);
        assert_eq!(wrong.delta, 0);
    }

    #[test]
    fn speed_award_by_rank() {
        let r = rules();
        let award = |rank| evaluate(RuleContext::Speed { rank }, Decision::Correct, &r).delta;
        assert_eq!([award(1), award(2), award(3), award(4), award(5)], [40, 30, 20, 10, 0]);
        assert_eq!(evaluate(RuleContext::Speed { rank: 1 }, Decision::Wrong, &r).delta, 0);
    }

    #[test]
    fn finish_star_doubles_and_penalises() {
        let r = rules();
        let ctx = RuleContext::FinishPrimary { value: 30, star: true };

        let right = evaluate(ctx, Decision::Correct, &r);
        assert_eq!(right.delta, 60);
        assert_eq!(right.star, Some(StarOutcome::Applied));

        let wrong = evaluate(ctx, Decision::Wrong, &r);
        assert_eq!(wrong.delta, -30);
        assert_eq!(wrong.star, Some(StarOutcome::Wasted));
        assert!(wrong.opens_steal_window);
    }

    #[test]
    fn finish_miss_without_star_costs_nothing() {
        let outcome = evaluate(
            RuleContext::FinishPrimary { value: 20, star: false },
            Decision::Timeout,
            &rules(),
        );
        assert_eq!(outcome.delta, 0);
        assert!(outcome.opens_steal_window);
        assert_eq!(outcome.star, None);
    }

    #[test]
    fn steal_transfers_unless_primary_starred() {
        let r = rules();
        let plain = evaluate(
            RuleContext::FinishSteal { value: 20, primary_starred: false },
            Decision::Correct,
            &r,
        );
        assert_eq!((plain.delta, plain.primary_delta), (20, Some(-20)));

        let starred = evaluate(
            RuleContext::FinishSteal { value: 20, primary_starred: true },
            Decision::Correct,
            &r,
        );
        assert_eq!(starred.primary_delta, None);

        let missed = evaluate(
            RuleContext::FinishSteal { value: 30, primary_starred: true },
            Decision::Wrong,
            &r,
        );
        assert_eq!(missed.delta, -15);
    }
}
