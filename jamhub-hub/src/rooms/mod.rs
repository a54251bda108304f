mod room;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use log::{info, warn};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use thiserror::Error;

pub use room::*;

use crate::{
    util::slugify, HubContext, HubEvent, PortError, RoomCloseReason, TransportError, TransportSpec,
};

/// Participant cap used when a room is created without one
pub const DEFAULT_MAX_PARTICIPANTS: usize = 4;

/// Recorded as the creator of the default room in single room mode
pub const SYSTEM_CREATOR: &str = "system";

/// How often the reaper looks for abandoned rooms
const REAP_INTERVAL: Duration = Duration::from_secs(30);

/// The in-memory registry of live rooms.
///
/// Rooms are not persisted; the registry is rebuilt empty on every startup.
pub struct RoomManager {
    context: HubContext,
    argon: Argon2<'static>,
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    next_seq: AtomicU64,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room {0} does not exist")]
    RoomNotFound(String),
    #[error("Room creation is disabled")]
    CreationDisabled,
    #[error("Room deletion is disabled")]
    DeletionDisabled,
    #[error("Only the room creator can delete it")]
    NotCreator,
    #[error("Room is full")]
    RoomFull,
    #[error("Bad passphrase")]
    BadPassphrase,
    #[error(transparent)]
    Ports(PortError),
    #[error(transparent)]
    Transport(TransportError),
    #[error("HashError: {0}")]
    HashError(String),
}

/// A new room as requested through the API
#[derive(Debug)]
pub struct NewRoom {
    pub name: String,
    pub passphrase: Option<String>,
    pub max_participants: Option<usize>,
}

/// Everything a client needs to point its own transport at the hub
#[derive(Debug, Clone)]
pub struct JoinInfo {
    pub room_id: String,
    pub room_name: String,
    pub hub_host: String,
    pub port: u16,
    /// Suggested JACK client name, so the joiner's ports line up with the
    /// room's transport ports
    pub client_name_hint: String,
    /// Extra flags the client should pass to its transport binary
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    /// The user was not in the room; leaving is an idempotent no-op
    NotIn,
}

impl RoomManager {
    pub fn new(context: &HubContext) -> Self {
        Self {
            context: context.clone(),
            argon: Argon2::default(),
            rooms: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Creates a new room: reserves a port, spawns its transport, and
    /// registers it. Any step failing rolls the earlier ones back.
    ///
    /// Runs detached, so a request cancelled mid-spawn cannot leak the port
    /// or leave the child unobserved.
    pub async fn create(
        self: &Arc<Self>,
        creator: &str,
        new_room: NewRoom,
    ) -> Result<Arc<Room>, RoomError> {
        if self.context.config.single_room_mode {
            return Err(RoomError::CreationDisabled);
        }

        let manager = self.clone();
        let creator = creator.to_string();

        run_detached(async move { manager.create_unchecked(&creator, new_room).await }).await
    }

    /// Creates the default room at startup in single room mode.
    pub async fn create_default_room(&self) -> Result<Arc<Room>, RoomError> {
        let name = self.context.config.band_name.clone();

        self.create_unchecked(
            SYSTEM_CREATOR,
            NewRoom {
                name,
                passphrase: None,
                max_participants: None,
            },
        )
        .await
    }

    async fn create_unchecked(
        &self,
        creator: &str,
        new_room: NewRoom,
    ) -> Result<Arc<Room>, RoomError> {
        let passphrase = match new_room.passphrase.as_deref() {
            Some(plain) => Some(self.hash_passphrase(plain)?),
            None => None,
        };

        let port = self.context.ports.acquire().map_err(RoomError::Ports)?;

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let room_id = format!("{}-{}", slugify(&new_room.name), seq);

        let spec = TransportSpec {
            room_id: room_id.clone(),
            port,
            channels: self.context.config.transport_channels,
        };

        let transport = match self.context.transport.spawn(spec).await {
            Ok(handle) => handle,
            Err(e) => {
                // The port must not leak when the transport never came up
                self.context.ports.release(port);
                return Err(RoomError::Transport(e));
            }
        };

        let room = Arc::new(Room::new(
            room_id.clone(),
            new_room.name,
            creator.to_string(),
            passphrase,
            new_room.max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS),
            transport,
        ));

        self.rooms.write().insert(room_id.clone(), room.clone());

        let privacy = if room.is_private() { "private" } else { "public" };
        info!(
            "Created {privacy} room '{}' ({room_id}) with transport on port {port}",
            room.name()
        );

        self.context.emit(HubEvent::RoomCreated { room_id });

        Ok(room)
    }

    /// Returns a room by id if it exists
    pub fn room_by_id(&self, room_id: &str) -> Result<Arc<Room>, RoomError> {
        self.rooms
            .read()
            .get(room_id)
            .cloned()
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))
    }

    /// All live rooms, oldest first
    pub fn list(&self) -> Vec<Arc<Room>> {
        let mut rooms: Vec<_> = self.rooms.read().values().cloned().collect();
        rooms.sort_by_key(|r| r.created_at());
        rooms
    }

    /// Participants across all rooms, for the health endpoint
    pub fn total_participants(&self) -> usize {
        self.list().iter().map(|r| r.participant_count()).sum()
    }

    /// Verifies the passphrase and adds the user to the room.
    /// Rejoining a room the user is already in returns the same info again.
    pub async fn join(
        &self,
        room_id: &str,
        user_id: &str,
        passphrase: Option<&str>,
    ) -> Result<JoinInfo, RoomError> {
        let room = self.room_by_id(room_id)?;

        if let Some(digest) = room.passphrase_digest() {
            if !self.verify_passphrase(passphrase.unwrap_or_default(), digest) {
                return Err(RoomError::BadPassphrase);
            }
        }

        match room.join(user_id) {
            JoinOutcome::Full => return Err(RoomError::RoomFull),
            JoinOutcome::Joined => {
                info!("User {user_id} joined room '{}'", room.name());
                self.context.emit(HubEvent::UserJoined {
                    room_id: room.id().to_string(),
                    user_id: user_id.to_string(),
                });
            }
            JoinOutcome::AlreadyIn => {}
        }

        Ok(JoinInfo {
            room_id: room.id().to_string(),
            room_name: room.name().to_string(),
            hub_host: self.context.config.host.clone(),
            port: room.port(),
            client_name_hint: room.id().to_string(),
            flags: vec!["-q".to_string(), "4".to_string()],
        })
    }

    /// Removes the user from the room. In multi room mode the room is
    /// destroyed as soon as its last participant leaves.
    ///
    /// Detached for the same reason as [RoomManager::create]: the teardown
    /// of an emptied room must run to completion once started.
    pub async fn leave(
        self: &Arc<Self>,
        room_id: &str,
        user_id: &str,
    ) -> Result<LeaveOutcome, RoomError> {
        let manager = self.clone();
        let room_id = room_id.to_string();
        let user_id = user_id.to_string();

        run_detached(async move { manager.leave_inner(&room_id, &user_id).await }).await
    }

    async fn leave_inner(&self, room_id: &str, user_id: &str) -> Result<LeaveOutcome, RoomError> {
        let room = self.room_by_id(room_id)?;

        if !room.leave(user_id) {
            return Ok(LeaveOutcome::NotIn);
        }

        info!("User {user_id} left room '{}'", room.name());
        self.context.emit(HubEvent::UserLeft {
            room_id: room.id().to_string(),
            user_id: user_id.to_string(),
        });

        if room.participant_count() == 0 && !self.context.config.single_room_mode {
            self.destroy(room_id, RoomCloseReason::Empty).await;
        }

        Ok(LeaveOutcome::Left)
    }

    /// Deletes a room on request of its creator or the hub owner.
    pub async fn delete(
        self: &Arc<Self>,
        room_id: &str,
        user_id: &str,
        is_owner: bool,
    ) -> Result<(), RoomError> {
        if self.context.config.single_room_mode {
            return Err(RoomError::DeletionDisabled);
        }

        let room = self.room_by_id(room_id)?;

        if room.creator() != user_id && !is_owner {
            return Err(RoomError::NotCreator);
        }

        let manager = self.clone();
        let room_id = room_id.to_string();

        run_detached(async move {
            manager.destroy(&room_id, RoomCloseReason::Deleted).await;
        })
        .await;

        Ok(())
    }

    /// Tears a room down: transport stopped, port released, record removed.
    async fn destroy(&self, room_id: &str, reason: RoomCloseReason) {
        let room = self.rooms.write().remove(room_id);

        let Some(room) = room else {
            return;
        };

        self.context.transport.stop(room.transport()).await;
        self.context.ports.release(room.port());

        info!("Room '{}' ({room_id}) destroyed: {reason:?}", room.name());

        self.context.emit(HubEvent::RoomDestroyed {
            room_id: room_id.to_string(),
            reason,
        });
    }

    /// Called when a room's transport died on its own. The room is gone from
    /// the participants' perspective, so the record follows it.
    pub async fn handle_transport_death(&self, room_id: &str) {
        let room = self.rooms.write().remove(room_id);

        let Some(room) = room else {
            return;
        };

        self.context.ports.release(room.port());

        warn!(
            "Room '{}' ({room_id}) destroyed after its transport died",
            room.name()
        );

        self.context.emit(HubEvent::RoomDestroyed {
            room_id: room_id.to_string(),
            reason: RoomCloseReason::TransportDied,
        });
    }

    /// Destroys every room. Used on hub shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<_> = self.rooms.read().keys().cloned().collect();

        for id in ids {
            self.destroy(&id, RoomCloseReason::Shutdown).await;
        }
    }

    /// Periodically collects rooms that sat empty beyond the configured
    /// grace. `leave` already destroys empty rooms; this catches rooms that
    /// were created but never joined.
    pub fn spawn_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let grace = Duration::from_secs(manager.context.config.reap_grace_secs);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REAP_INTERVAL);

            loop {
                interval.tick().await;

                if manager.context.config.single_room_mode {
                    continue;
                }

                let expired: Vec<_> = manager
                    .list()
                    .into_iter()
                    .filter(|room| room.empty_for().map(|d| d > grace).unwrap_or(false))
                    .map(|room| room.id().to_string())
                    .collect();

                for room_id in expired {
                    info!("Reaping empty room {room_id}");
                    manager.destroy(&room_id, RoomCloseReason::Empty).await;
                }
            }
        })
    }

    fn hash_passphrase(&self, plain: &str) -> Result<String, RoomError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon
            .hash_password(plain.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| RoomError::HashError(e.to_string()))
    }

    /// Constant-time verification against the stored digest
    fn verify_passphrase(&self, plain: &str, digest: &str) -> bool {
        PasswordHash::parse(digest, Encoding::default())
            .map(|parsed| {
                self.argon
                    .verify_password(plain.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}

/// Runs a registry mutation on its own task, insulating it from request
/// cancellation. The await only observes the outcome.
async fn run_detached<F, T>(future: F) -> T
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(future)
        .await
        .expect("room mutation completes")
}
