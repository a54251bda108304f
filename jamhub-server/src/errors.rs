use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde_json::json;
use thiserror::Error;

use jamhub_hub::{
    AuthError, DatabaseError, JackError, PermissionError, PortError, RoomError, TransportError,
};

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    // Authentication
    #[error("missing or invalid authorization")]
    MissingAuthorization,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("invalid credentials")]
    InvalidCredentials,
    // General
    #[error("{resource} not found")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    #[error("{field} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("internal error")]
    Unknown(String),
    // Rooms
    #[error("bad passphrase")]
    BadPassphrase,
    #[error("room is full")]
    RoomFull,
    #[error("room creation disabled")]
    RoomCreationDisabled,
    #[error("room deletion disabled")]
    RoomDeletionDisabled,
    #[error("only the room creator can delete it")]
    NotRoomCreator,
    #[error("no free transport ports")]
    CapacityExceeded,
    #[error("transport failed: {0}")]
    TransportFailed(String),
    // Patchbay
    #[error("ports are already connected")]
    AlreadyConnected,
    #[error("ports are not connected")]
    NotConnected,
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::MissingAuthorization | Self::InvalidToken | Self::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } | Self::RoomFull | Self::AlreadyConnected | Self::NotConnected => {
                StatusCode::CONFLICT
            }
            Self::Validation(_) | Self::BadPassphrase => StatusCode::BAD_REQUEST,
            Self::Forbidden(_)
            | Self::RoomCreationDisabled
            | Self::RoomDeletionDisabled
            | Self::NotRoomCreator => StatusCode::FORBIDDEN,
            Self::CapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,
            Self::TransportFailed(_) | Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.as_status_code();

        // Server faults are logged with their detail; clients only ever see
        // the short error string
        if status.as_u16() >= 500 {
            match &self {
                Self::Unknown(detail) => error!("Request failed: {detail}"),
                other => error!("Request failed: {other}"),
            }
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::NameTaken(name) => Self::Conflict {
                resource: "user",
                field: "username",
                value: name,
            },
            AuthError::Db(e) => e.into(),
            AuthError::HashError(e) => Self::Unknown(e),
        }
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::Conflict {
                resource,
                field,
                value,
            },
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::RoomNotFound(identifier) => Self::NotFound {
                resource: "room",
                identifier,
            },
            RoomError::CreationDisabled => Self::RoomCreationDisabled,
            RoomError::DeletionDisabled => Self::RoomDeletionDisabled,
            RoomError::NotCreator => Self::NotRoomCreator,
            RoomError::RoomFull => Self::RoomFull,
            RoomError::BadPassphrase => Self::BadPassphrase,
            RoomError::Ports(PortError::Exhausted) => Self::CapacityExceeded,
            RoomError::Transport(e) => e.into(),
            RoomError::HashError(e) => Self::Unknown(e),
        }
    }
}

impl From<TransportError> for ServerError {
    fn from(value: TransportError) -> Self {
        Self::TransportFailed(value.to_string())
    }
}

impl From<JackError> for ServerError {
    fn from(value: JackError) -> Self {
        match value {
            JackError::InvalidPort(port) => Self::Validation(format!("unknown port {port}")),
            JackError::IncompatibleDirection { .. } => {
                Self::Validation("source must be an output and dest an input".to_string())
            }
            JackError::AlreadyConnected => Self::AlreadyConnected,
            JackError::NotConnected => Self::NotConnected,
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<PermissionError> for ServerError {
    fn from(value: PermissionError) -> Self {
        Self::Forbidden(value.to_string())
    }
}
