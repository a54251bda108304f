use chrono::{DateTime, Utc};

/// A hub account
#[derive(Debug, Clone)]
pub struct UserData {
    /// Opaque identifier, unique for the lifetime of the deployment
    pub id: String,
    pub username: String,
    /// The salted password digest. Never leaves the hub.
    pub password: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    /// The first registered user owns the deployment. Immutable afterwards.
    pub is_owner: bool,
    pub has_patchbay_access: bool,
}

impl UserData {
    /// Whether this user may mutate the audio graph.
    /// The owner's patchbay access is implicit and unrevokable.
    pub fn can_patch(&self) -> bool {
        self.is_owner || self.has_patchbay_access
    }
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    /// The bearer token identifying the session
    pub token: String,
    pub created_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

#[derive(Debug)]
pub struct NewUser {
    pub id: String,
    pub username: String,
    /// Already-hashed password digest
    pub password: String,
    pub email: Option<String>,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: String,
}
