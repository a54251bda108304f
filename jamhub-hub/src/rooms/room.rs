use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::TransportHandle;

/// A live collaboration room: one transport process, one UDP port, and the
/// participants currently connected through it.
///
/// The participant set is guarded by the room's own lock; the registry-wide
/// lock in [super::RoomManager] only guards the room map. Lock order is
/// always registry first, then room.
pub struct Room {
    id: String,
    name: String,
    /// User id of the creator, or "system" for the single-room-mode default
    creator: String,
    created_at: DateTime<Utc>,
    /// Argon2 digest of the passphrase. `None` means the room is public.
    passphrase: Option<String>,
    max_participants: usize,
    transport: TransportHandle,
    participants: Mutex<Vec<String>>,
    empty_since: Mutex<Option<Instant>>,
}

/// What happened when a user asked to enter a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    /// Rejoining is idempotent
    AlreadyIn,
    Full,
}

impl Room {
    pub fn new(
        id: String,
        name: String,
        creator: String,
        passphrase: Option<String>,
        max_participants: usize,
        transport: TransportHandle,
    ) -> Self {
        Self {
            id,
            name,
            creator,
            created_at: Utc::now(),
            passphrase,
            max_participants,
            transport,
            participants: Mutex::new(Vec::new()),
            // A freshly created room is empty until someone joins
            empty_since: Mutex::new(Some(Instant::now())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn port(&self) -> u16 {
        self.transport.port
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    pub fn is_private(&self) -> bool {
        self.passphrase.is_some()
    }

    pub(super) fn passphrase_digest(&self) -> Option<&str> {
        self.passphrase.as_deref()
    }

    pub fn max_participants(&self) -> usize {
        self.max_participants
    }

    pub fn participants(&self) -> Vec<String> {
        self.participants.lock().clone()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.lock().len()
    }

    /// Adds a user to the room, enforcing the participant cap.
    pub fn join(&self, user_id: &str) -> JoinOutcome {
        let mut participants = self.participants.lock();

        if participants.iter().any(|p| p == user_id) {
            return JoinOutcome::AlreadyIn;
        }

        if participants.len() >= self.max_participants {
            return JoinOutcome::Full;
        }

        participants.push(user_id.to_string());
        *self.empty_since.lock() = None;

        JoinOutcome::Joined
    }

    /// Removes a user from the room. Returns false if they were not in it.
    pub fn leave(&self, user_id: &str) -> bool {
        let mut participants = self.participants.lock();
        let before = participants.len();

        participants.retain(|p| p != user_id);
        let removed = participants.len() < before;

        if removed && participants.is_empty() {
            *self.empty_since.lock() = Some(Instant::now());
        }

        removed
    }

    /// How long the room has been without participants, if it is empty
    pub fn empty_for(&self) -> Option<Duration> {
        self.empty_since.lock().map(|since| since.elapsed())
    }
}
