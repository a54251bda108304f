use thiserror::Error;

use crate::UserData;

/// Everything an authenticated user can ask the hub to do.
///
/// Registration and login are unauthenticated and never reach this check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListRooms,
    CreateRoom,
    JoinRoom,
    LeaveRoom,
    ViewGraph,
    /// Connecting or disconnecting audio ports, via REST or WebSocket
    MutateGraph,
    ListUsers,
    /// Granting or revoking patchbay access
    ManagePermissions,
}

impl Action {
    fn describe(&self) -> &'static str {
        match self {
            Self::ListRooms => "list rooms",
            Self::CreateRoom => "create rooms",
            Self::JoinRoom => "join rooms",
            Self::LeaveRoom => "leave rooms",
            Self::ViewGraph => "view the audio graph",
            Self::MutateGraph => "modify audio routing",
            Self::ListUsers => "list users",
            Self::ManagePermissions => "manage permissions",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Not allowed to {action}")]
pub struct PermissionError {
    action: &'static str,
}

/// The single permission predicate every mutating request goes through.
pub fn authorize(user: &UserData, action: Action) -> Result<(), PermissionError> {
    let allowed = match action {
        Action::MutateGraph => user.can_patch(),
        Action::ListUsers | Action::ManagePermissions => user.is_owner,
        // Everything else only requires a valid session
        _ => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(PermissionError {
            action: action.describe(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(is_owner: bool, has_patchbay_access: bool) -> UserData {
        UserData {
            id: "u1".to_string(),
            username: "alice".to_string(),
            password: "digest".to_string(),
            email: None,
            created_at: Utc::now(),
            is_owner,
            has_patchbay_access,
        }
    }

    #[test]
    fn regular_users_cannot_patch_or_administrate() {
        let bob = user(false, false);

        assert!(authorize(&bob, Action::ListRooms).is_ok());
        assert!(authorize(&bob, Action::JoinRoom).is_ok());
        assert!(authorize(&bob, Action::ViewGraph).is_ok());
        assert!(authorize(&bob, Action::MutateGraph).is_err());
        assert!(authorize(&bob, Action::ListUsers).is_err());
        assert!(authorize(&bob, Action::ManagePermissions).is_err());
    }

    #[test]
    fn patchbay_access_allows_graph_mutation_only() {
        let engineer = user(false, true);

        assert!(authorize(&engineer, Action::MutateGraph).is_ok());
        assert!(authorize(&engineer, Action::ListUsers).is_err());
    }

    #[test]
    fn owner_can_do_everything() {
        let owner = user(true, false);

        assert!(authorize(&owner, Action::MutateGraph).is_ok());
        assert!(authorize(&owner, Action::ListUsers).is_ok());
        assert!(authorize(&owner, Action::ManagePermissions).is_ok());
    }
}
