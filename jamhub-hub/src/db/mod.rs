use async_trait::async_trait;
use thiserror::Error;

mod data;
mod sqlite;

pub use data::*;
pub use sqlite::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
}

/// Represents a type that can persist hub users and sessions
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn user_by_id(&self, user_id: &str) -> Result<UserData>;
    async fn user_by_username(&self, username: &str) -> Result<UserData>;
    /// Inserts a user. The check for "is this the first user" and the insert
    /// happen in one transaction, so exactly one registration ever becomes
    /// the owner.
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;
    async fn set_patchbay_access(&self, user_id: &str, value: bool) -> Result<UserData>;
    async fn list_users(&self) -> Result<Vec<UserData>>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;

    /// Flushes and closes the underlying store
    async fn close(&self);
}

pub(crate) trait IntoDatabaseError {
    fn any(self) -> DatabaseError;
    fn not_found_or(self, resource: &'static str, identifier: &str) -> DatabaseError;
    fn conflict_or_any(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> DatabaseError;
}
