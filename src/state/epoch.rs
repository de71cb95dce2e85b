//! Buzzer epoch filtering.
//!
//! An epoch starts at a reset marker and lasts until the next one. Only signals stamped
//! with the marker's id and not older than the marker count; the same filter is served
//! to clients so their local winner prediction matches the authoritative one.

use uuid::Uuid;

use crate::dao::models::{BuzzKind, BuzzResult, BuzzerEventEntity};

/// Most recent reset marker of a question's event log.
pub fn latest_reset(events: &[BuzzerEventEntity]) -> Option<&BuzzerEventEntity> {
    events
        .iter()
        .filter(|event| event.event_type == BuzzKind::Reset)
        .max_by_key(|event| event.occurred_at)
}

/// Signals belonging to the epoch opened by `reset`, in commit order.
pub fn events_in_epoch<'a>(
    events: &'a [BuzzerEventEntity],
    reset: &BuzzerEventEntity,
) -> Vec<&'a BuzzerEventEntity> {
    events
        .iter()
        .filter(|event| {
            event.event_type != BuzzKind::Reset
                && event.epoch_id == Some(reset.id)
                && event.occurred_at >= reset.occurred_at
        })
        .collect()
}

/// Winner of the current epoch, if anyone has won it yet.
pub fn resolve_winner(events: &[BuzzerEventEntity]) -> Option<&BuzzerEventEntity> {
    let reset = latest_reset(events)?;
    events_in_epoch(events, reset)
        .into_iter()
        .find(|event| event.result == Some(BuzzResult::Win))
}

/// Key under which the store claims the single win of an epoch.
pub fn epoch_key(question_id: Uuid, reset_id: Uuid) -> String {
    format!("{question_id}:{reset_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset(question_id: Uuid, at: i64) -> BuzzerEventEntity {
        let id = Uuid::new_v4();
        BuzzerEventEntity {
            id,
            match_id: Uuid::nil(),
            question_id,
            player_id: None,
            event_type: BuzzKind::Reset,
            result: None,
            epoch_id: Some(id),
            occurred_at: at,
        }
    }

    fn buzz(
        question_id: Uuid,
        epoch: Uuid,
        at: i64,
        result: BuzzResult,
    ) -> BuzzerEventEntity {
        BuzzerEventEntity {
            id: Uuid::new_v4(),
            match_id: Uuid::nil(),
            question_id,
            player_id: Some(Uuid::new_v4()),
            event_type: BuzzKind::Buzz,
            result: Some(result),
            epoch_id: Some(epoch),
            occurred_at: at,
        }
    }

    #[test]
    fn win_before_reset_is_ignored() {
        let q = Uuid::new_v4();
        let first = reset(q, 100);
        let old_win = buzz(q, first.id, 150, BuzzResult::Win);
        let second = reset(q, 200);
        let events = vec![first, old_win, second];

        assert!(resolve_winner(&events).is_none());
    }

    #[test]
    fn winner_is_scoped_to_latest_epoch() {
        let q = Uuid::new_v4();
        let first = reset(q, 100);
        let second = reset(q, 200);
        let win = buzz(q, second.id, 250, BuzzResult::Win);
        let lose = buzz(q, second.id, 320, BuzzResult::Lose);
        let events = vec![first, second.clone(), win.clone(), lose];

        assert_eq!(resolve_winner(&events).map(|e| e.id), Some(win.id));
        assert_eq!(events_in_epoch(&events, &second).len(), 2);
    }

    #[test]
    fn signal_stamped_with_stale_epoch_is_excluded() {
        let q = Uuid::new_v4();
        let first = reset(q, 100);
        let second = reset(q, 200);
        let stale = buzz(q, first.id, 210, BuzzResult::Win);
        let events = vec![first, second.clone(), stale];

        assert!(events_in_epoch(&events, &second).is_empty());
    }
}
