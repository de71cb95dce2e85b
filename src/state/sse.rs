use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::sse::ServerEvent;

/// Per-match broadcast hubs, created lazily on first publish or subscribe.
pub struct EventBus {
    capacity: usize,
    hubs: DashMap<Uuid, SseHub>,
}

impl EventBus {
    /// Build an empty bus whose hubs use the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            hubs: DashMap::new(),
        }
    }

    /// Register a new subscriber on the hub of `match_id`.
    pub fn subscribe(&self, match_id: Uuid) -> broadcast::Receiver<ServerEvent> {
        self.hubs
            .entry(match_id)
            .or_insert_with(|| SseHub::new(self.capacity))
            .subscribe()
    }

    /// Publish on the hub of `match_id`; dropped when nobody ever subscribed.
    pub fn publish(&self, match_id: Uuid, event: ServerEvent) {
        if let Some(hub) = self.hubs.get(&match_id) {
            hub.broadcast(event);
        }
    }

    /// Publish the same event on every hub.
    pub fn publish_all(&self, event: ServerEvent) {
        for hub in self.hubs.iter() {
            hub.broadcast(event.clone());
        }
    }
}

/// Simple broadcast hub wrapper used by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_stay_inside_their_match() {
        let bus = EventBus::new(8);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rx_a = bus.subscribe(a);
        let mut rx_b = bus.subscribe(b);

        bus.publish(a, ServerEvent::new(Some("change".into()), "{}".into()));

        assert_eq!(rx_a.recv().await.unwrap().event.as_deref(), Some("change"));
        assert!(rx_b.try_recv().is_err());
    }
}
