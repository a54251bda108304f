mod auth;
mod config;
mod db;
mod events;
mod jack;
mod permissions;
mod ports;
mod rooms;
mod transport;
mod util;

use std::sync::Arc;

pub use auth::*;
pub use config::*;
pub use db::*;
pub use events::*;
pub use jack::*;
pub use permissions::*;
pub use ports::*;
pub use rooms::*;
pub use transport::*;

/// The jamhub core: credential store, room registry, transport supervision
/// and the JACK patchbay, behind one handle the server crate talks to.
pub struct Hub<Db = SqliteDatabase> {
    context: HubContext,
    database: Arc<Db>,

    pub auth: Auth<Db>,
    pub rooms: Arc<RoomManager>,
}

/// Shared state passed to the components of the hub, to access
/// configuration, allocate resources and emit events.
#[derive(Clone)]
pub struct HubContext {
    pub config: HubConfig,
    pub ports: Arc<PortAllocator>,
    pub transport: Arc<TransportSupervisor>,
    pub patchbay: Arc<JackPatchbay>,
    pub events: Events,
}

impl HubContext {
    pub fn emit(&self, event: HubEvent) {
        self.events.emit(event)
    }
}

impl<Db> Hub<Db>
where
    Db: Database,
{
    /// Wires the hub together. Must run inside a tokio runtime, since the
    /// transport death watcher is spawned here.
    pub fn new(config: HubConfig, database: Db, launcher: Arc<dyn TransportLauncher>) -> Self {
        let database = Arc::new(database);
        let events = Events::new();

        let (supervisor, mut deaths) = TransportSupervisor::new(launcher);

        let context = HubContext {
            ports: Arc::new(PortAllocator::new(
                config.transport_base_port,
                config.transport_port_range,
            )),
            transport: Arc::new(supervisor),
            patchbay: Arc::new(JackPatchbay::new(events.clone())),
            events,
            config,
        };

        let rooms = Arc::new(RoomManager::new(&context));
        let auth = Auth::new(&database);

        // A transport dying takes its room with it
        let death_rooms = rooms.clone();
        tokio::spawn(async move {
            while let Some(room_id) = deaths.recv().await {
                death_rooms.handle_transport_death(&room_id).await;
            }
        });

        Self {
            context,
            database,
            auth,
            rooms,
        }
    }

    /// Startup work that needs the hub fully constructed: in single room
    /// mode the default room exists before anyone logs in.
    pub async fn init(&self) -> std::result::Result<(), RoomError> {
        if self.context.config.single_room_mode {
            self.rooms.create_default_room().await?;
        }

        Ok(())
    }

    pub fn config(&self) -> &HubConfig {
        &self.context.config
    }

    pub fn patchbay(&self) -> &JackPatchbay {
        &self.context.patchbay
    }

    /// Subscribe to room and graph change events
    pub fn subscribe(&self) -> EventReceiver {
        self.context.events.subscribe()
    }

    /// Destroys every room, stops every transport, and closes the store.
    pub async fn shutdown(&self) {
        self.rooms.shutdown().await;
        self.database.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn hub_with(
        config: HubConfig,
        launcher: CommandLauncher,
    ) -> Hub<SqliteDatabase> {
        let database = SqliteDatabase::in_memory().await.unwrap();
        Hub::new(config, database, Arc::new(launcher))
    }

    #[tokio::test]
    async fn single_room_mode_creates_the_default_room_at_startup() {
        let config = HubConfig {
            single_room_mode: true,
            band_name: "The Band".to_string(),
            ..HubConfig::default()
        };

        let hub = hub_with(config, CommandLauncher::new("sleep", &["600"])).await;
        hub.init().await.unwrap();

        let rooms = hub.rooms.list();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name(), "The Band");
        assert_eq!(rooms[0].creator(), SYSTEM_CREATOR);

        hub.shutdown().await;
    }

    #[tokio::test]
    async fn transport_death_is_pumped_into_the_registry() {
        let hub = hub_with(HubConfig::default(), CommandLauncher::new("sleep", &["1"])).await;
        hub.init().await.unwrap();

        let mut events = hub.subscribe();
        let room = hub
            .rooms
            .create(
                "alice",
                NewRoom {
                    name: "Jam".to_string(),
                    passphrase: None,
                    max_participants: None,
                },
            )
            .await
            .unwrap();

        // Skip the creation event, then wait for the death-driven teardown
        loop {
            match events.recv().await.unwrap() {
                HubEvent::RoomDestroyed { room_id, reason } => {
                    assert_eq!(room_id, room.id());
                    assert_eq!(reason, RoomCloseReason::TransportDied);
                    break;
                }
                _ => continue,
            }
        }

        assert!(hub.rooms.room_by_id(room.id()).is_err());
        hub.shutdown().await;
    }
}
