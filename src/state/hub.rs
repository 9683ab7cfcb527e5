use tokio::sync::broadcast;

use crate::dto::ws::ServerEvent;

/// Broadcast hub fanning a room's snapshots out to its sockets.
pub struct SnapshotHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SnapshotHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
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

    /// Number of sockets currently listening.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
