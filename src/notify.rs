use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for LISTEN per location. Every committed event is fanned
/// out on its location's channel; delivery beyond the hub is out of scope.
pub struct NotifyHub {
    channels: DashMap<u32, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a location. Creates the channel if needed.
    pub fn subscribe(&self, location_id: u32) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(location_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, location_id: u32, event: &Event) {
        if let Some(sender) = self.channels.get(&location_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when a location is deleted).
    pub fn remove(&self, location_id: u32) {
        self.channels.remove(&location_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(3);

        let event = Event::LocationCreated {
            id: 3,
            name: "North Lot".into(),
            address: "1 Plaza Dr".into(),
        };
        hub.send(3, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        // No subscriber — should not panic
        hub.send(7, &Event::LocationDeleted { id: 7 });
    }
}
