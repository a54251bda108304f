//! All response bodies exposed from endpoints are defined here
//! along with the conversions from the hub's own types

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jamhub_hub::{
    GraphSnapshot, JoinInfo, PortDirection, PortKind, Room as HubRoom, SessionData, UserData,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct User {
    id: String,
    username: String,
    created_at: DateTime<Utc>,
    is_owner: bool,
    has_patchbay_access: bool,
}

/// Returned from both registration and login
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthResult {
    token: String,
    user_id: String,
    is_owner: bool,
    has_patchbay_access: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomSummary {
    id: String,
    name: String,
    creator: String,
    participants: usize,
    max_participants: usize,
    is_private: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomDetail {
    id: String,
    name: String,
    creator: String,
    created_at: DateTime<Utc>,
    participants: Vec<String>,
    max_participants: usize,
    is_private: bool,
    jacktrip_port: u16,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinResult {
    room_id: String,
    room_name: String,
    hub_host: String,
    jacktrip_port: u16,
    client_name_hint: String,
    jacktrip_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatusBody {
    pub status: &'static str,
}

impl StatusBody {
    pub fn ok() -> Self {
        Self { status: "ok" }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EdgeResult {
    pub status: &'static str,
    pub source: String,
    pub dest: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub active_rooms: usize,
    pub total_participants: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Graph {
    clients: Vec<GraphClientBody>,
    connections: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GraphClientBody {
    name: String,
    ports: Vec<GraphPortBody>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GraphPortBody {
    name: String,
    direction: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    connections: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GraphEdge {
    source: String,
    dest: String,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id.clone(),
            username: self.username.clone(),
            created_at: self.created_at,
            is_owner: self.is_owner,
            has_patchbay_access: self.has_patchbay_access,
        }
    }
}

impl ToSerialized<AuthResult> for SessionData {
    fn to_serialized(&self) -> AuthResult {
        AuthResult {
            token: self.token.clone(),
            user_id: self.user.id.clone(),
            is_owner: self.user.is_owner,
            // The response reports effective access, which for the owner is
            // implicit
            has_patchbay_access: self.user.can_patch(),
        }
    }
}

impl ToSerialized<RoomSummary> for Arc<HubRoom> {
    fn to_serialized(&self) -> RoomSummary {
        RoomSummary {
            id: self.id().to_string(),
            name: self.name().to_string(),
            creator: self.creator().to_string(),
            participants: self.participant_count(),
            max_participants: self.max_participants(),
            is_private: self.is_private(),
        }
    }
}

impl ToSerialized<RoomDetail> for Arc<HubRoom> {
    fn to_serialized(&self) -> RoomDetail {
        RoomDetail {
            id: self.id().to_string(),
            name: self.name().to_string(),
            creator: self.creator().to_string(),
            created_at: self.created_at(),
            participants: self.participants(),
            max_participants: self.max_participants(),
            is_private: self.is_private(),
            jacktrip_port: self.port(),
        }
    }
}

impl ToSerialized<JoinResult> for JoinInfo {
    fn to_serialized(&self) -> JoinResult {
        JoinResult {
            room_id: self.room_id.clone(),
            room_name: self.room_name.clone(),
            hub_host: self.hub_host.clone(),
            jacktrip_port: self.port,
            client_name_hint: self.client_name_hint.clone(),
            jacktrip_flags: self.flags.clone(),
        }
    }
}

impl ToSerialized<Graph> for GraphSnapshot {
    fn to_serialized(&self) -> Graph {
        let clients = self
            .clients
            .iter()
            .map(|client| GraphClientBody {
                name: client.name.clone(),
                ports: client
                    .ports
                    .iter()
                    .map(|port| GraphPortBody {
                        name: port.name.clone(),
                        direction: match port.direction {
                            PortDirection::Output => "output",
                            PortDirection::Input => "input",
                        },
                        kind: match port.kind {
                            PortKind::Audio => "audio",
                            PortKind::Midi => "midi",
                        },
                        connections: port.connections.clone(),
                    })
                    .collect(),
            })
            .collect();

        let connections = self
            .edges()
            .into_iter()
            .map(|(source, dest)| GraphEdge { source, dest })
            .collect();

        Graph {
            clients,
            connections,
        }
    }
}
