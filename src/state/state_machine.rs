use thiserror::Error;

use crate::dao::models::{QuestionState, SessionEntity, SessionStatus};

/// Lifecycle and display state of a session, the part every named transition moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPhase {
    /// Whether the session is pending, running or ended.
    pub status: SessionStatus,
    /// Display state of the current question.
    pub display: QuestionState,
}

impl From<&SessionEntity> for SessionPhase {
    fn from(session: &SessionEntity) -> Self {
        Self {
            status: session.status,
            display: session.question_state,
        }
    }
}

/// Events that can be applied to the session machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Moderator (re)opens the session.
    Open,
    /// Moderator closes the session.
    End,
    /// Transient state is wiped; display goes back to waiting.
    Reset,
    /// A round was selected; no question is current yet.
    EnterRound,
    /// Navigation landed on a question.
    Land {
        /// Put the question on screen right away.
        show: bool,
    },
    /// Re-display of the current question.
    Show,
    /// Take the current question off screen.
    Hide,
    /// Finish-round primary missed: the answer shows and steals open.
    OpenStealWindow,
    /// The question was decided.
    Complete,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the session was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// A validated transition, ready to be written onto a session copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Phase the session is leaving.
    pub from: SessionPhase,
    /// Phase the session lands in.
    pub to: SessionPhase,
    /// Event driving the transition.
    pub event: SessionEvent,
}

impl Plan {
    /// Write the target phase onto `session`. Versioning is left to the store commit.
    pub fn apply(&self, session: &mut SessionEntity) {
        session.status = self.to.status;
        session.question_state = self.to.display;
    }
}

/// Validate `event` against the current phase of `session`.
pub fn plan(session: &SessionEntity, event: SessionEvent) -> Result<Plan, InvalidTransition> {
    let from = SessionPhase::from(session);
    let to = compute_transition(from, event)?;
    Ok(Plan { from, to, event })
}

/// Compute a transition from an event if the transition is valid.
pub fn compute_transition(
    from: SessionPhase,
    event: SessionEvent,
) -> Result<SessionPhase, InvalidTransition> {
    use QuestionState::*;
    use SessionStatus::*;

    let running = |display| SessionPhase {
        status: Running,
        display,
    };

    let next = match (from.status, from.display, event) {
        (Pending | Ended, _, SessionEvent::Open) => running(Hidden),
        (Running, _, SessionEvent::End) => SessionPhase {
            status: Ended,
            display: Hidden,
        },
        (status, _, SessionEvent::Reset) => SessionPhase {
            status,
            display: Hidden,
        },
        (Running, _, SessionEvent::EnterRound) => running(Hidden),
        (Running, _, SessionEvent::Land { show: true }) => running(Showing),
        (Running, _, SessionEvent::Land { show: false }) => running(Hidden),
        (Running, _, SessionEvent::Show) => running(Showing),
        (Running, _, SessionEvent::Hide) => running(Hidden),
        (Running, Showing, SessionEvent::OpenStealWindow) => running(AnswerRevealed),
        (Running, Showing | AnswerRevealed | Completed, SessionEvent::Complete) => {
            running(Completed)
        }
        _ => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn session(status: SessionStatus, display: QuestionState) -> SessionEntity {
        let mut session = SessionEntity::pending(Uuid::new_v4(), 0);
        session.status = status;
        session.question_state = display;
        session
    }

    fn apply(session: &mut SessionEntity, event: SessionEvent) -> SessionPhase {
        let plan = plan(session, event).unwrap();
        plan.apply(session);
        plan.to
    }

    #[test]
    fn question_cycle_through_steal_window() {
        let mut s = session(SessionStatus::Pending, QuestionState::Hidden);

        apply(&mut s, SessionEvent::Open);
        assert_eq!(s.status, SessionStatus::Running);
        apply(&mut s, SessionEvent::Land { show: true });
        assert_eq!(s.question_state, QuestionState::Showing);
        apply(&mut s, SessionEvent::OpenStealWindow);
        assert_eq!(s.question_state, QuestionState::AnswerRevealed);
        apply(&mut s, SessionEvent::Complete);
        assert_eq!(s.question_state, QuestionState::Completed);
        apply(&mut s, SessionEvent::Land { show: false });
        assert_eq!(s.question_state, QuestionState::Hidden);
    }

    #[test]
    fn completed_question_can_be_redisplayed() {
        let mut s = session(SessionStatus::Running, QuestionState::Completed);
        assert_eq!(
            apply(&mut s, SessionEvent::Show).display,
            QuestionState::Showing
        );
    }

    #[test]
    fn running_session_cannot_be_opened_twice() {
        let s = session(SessionStatus::Running, QuestionState::Showing);
        let err = plan(&s, SessionEvent::Open).unwrap_err();
        assert_eq!(err.event, SessionEvent::Open);
        assert_eq!(err.from.status, SessionStatus::Running);
    }

    #[test]
    fn display_events_require_running_session() {
        let s = session(SessionStatus::Ended, QuestionState::Hidden);
        assert!(plan(&s, SessionEvent::Show).is_err());
        assert!(plan(&s, SessionEvent::Land { show: false }).is_err());
    }

    #[test]
    fn hidden_question_cannot_be_decided_or_stolen() {
        let s = session(SessionStatus::Running, QuestionState::Hidden);
        assert!(plan(&s, SessionEvent::Complete).is_err());
        assert!(plan(&s, SessionEvent::OpenStealWindow).is_err());
    }

    #[test]
    fn reset_keeps_status_and_hides() {
        let mut s = session(SessionStatus::Ended, QuestionState::Completed);
        let next = apply(&mut s, SessionEvent::Reset);
        assert_eq!(next.status, SessionStatus::Ended);
        assert_eq!(next.display, QuestionState::Hidden);
    }
}
