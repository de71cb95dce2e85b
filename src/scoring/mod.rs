/// Answer normalisation and loose comparison.
pub mod grading;
/// Per-round point rules.
pub mod rules;

pub use self::rules::{Decision, RuleContext, RuleOutcome, evaluate};
