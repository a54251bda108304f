use tokio::sync::broadcast;

/// How many events may queue up per subscriber before it starts lagging
const EVENT_CAPACITY: usize = 256;

pub type EventReceiver = broadcast::Receiver<HubEvent>;

/// Events emitted by the hub as rooms and the audio graph change.
///
/// Subscribers that fall behind see a lag error and are expected to
/// reconcile from the next full graph snapshot.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// A room was created and its transport is listening
    RoomCreated { room_id: String },
    /// A room was destroyed and its port released
    RoomDestroyed {
        room_id: String,
        reason: RoomCloseReason,
    },
    /// A user entered a room
    UserJoined { room_id: String, user_id: String },
    /// A user left a room
    UserLeft { room_id: String, user_id: String },
    /// An edge of the audio graph was added or removed
    GraphChanged { change: GraphChange },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomCloseReason {
    /// The last participant left, or the reaper collected an empty room
    Empty,
    /// The room's transport process died unexpectedly
    TransportDied,
    /// Deleted through the API by its creator or the hub owner
    Deleted,
    /// The hub is shutting down
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum GraphChange {
    Connected { source: String, dest: String },
    Disconnected { source: String, dest: String },
}

/// Fan-out bus for [HubEvent]s. Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct Events {
    sender: broadcast::Sender<HubEvent>,
}

impl Events {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Delivers an event to every current subscriber.
    /// Events emitted while nobody listens are dropped.
    pub fn emit(&self, event: HubEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}
