use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, RoomId};

const CHANNEL_CAPACITY: usize = 256;

/// Per-room change feed. Every committed room or reservation save is
/// broadcast to the room's subscribers, so downstream caches (front-desk
/// boards, report builders) can invalidate on each transition.
pub struct NotifyHub {
    channels: DashMap<RoomId, broadcast::Sender<Event>>,
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

    /// Subscribe to a room. Creates the channel if needed.
    pub fn subscribe(&self, room_id: &RoomId) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(room_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, room_id: &RoomId, event: &Event) {
        if let Some(sender) = self.channels.get(room_id) {
            let _ = sender.send(event.clone());
        }
    }
}
