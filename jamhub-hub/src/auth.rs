use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::rngs::OsRng;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    util::random_string, Database, DatabaseError, NewSession, NewUser, SessionData, UserData,
};

/// How many characters of alphanumeric entropy go into a bearer token
const TOKEN_LENGTH: usize = 32;

/// The credential store of the hub: accounts, sessions, and the patchbay
/// permission flag.
pub struct Auth<Db> {
    db: Arc<Db>,
    argon: Argon2<'static>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The requested username is already registered
    #[error("Username {0} is taken")]
    NameTaken(String),
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl<Db> Auth<Db>
where
    Db: Database,
{
    pub fn new(db: &Arc<Db>) -> Self {
        Self {
            db: db.clone(),
            argon: Argon2::default(),
        }
    }

    /// Registers a new user and logs them in, returning a fresh session.
    ///
    /// The first registration on a deployment becomes the owner; the
    /// election happens atomically in the storage layer.
    pub async fn register(&self, new_user: NewPlainUser) -> Result<SessionData, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon
            .hash_password(new_user.password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashError(e.to_string()))?
            .to_string();

        let user = self
            .db
            .create_user(NewUser {
                id: Uuid::new_v4().to_string(),
                username: new_user.username,
                password: digest,
                email: new_user.email,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict { value, .. } => AuthError::NameTaken(value),
                err => AuthError::Db(err),
            })?;

        self.create_session(&user.id).await
    }

    /// Logs in a user, returning a new session
    pub async fn login(&self, credentials: Credentials) -> Result<SessionData, AuthError> {
        let user = self
            .db
            .user_by_username(&credentials.username)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidCredentials,
                err => AuthError::Db(err),
            })?;

        let stored_password = PasswordHash::parse(&user.password, Encoding::default())
            .map_err(|e| AuthError::HashError(e.to_string()))?;

        self.argon
            .verify_password(credentials.password.as_bytes(), &stored_password)
            .map_err(|_| AuthError::InvalidCredentials)?;

        self.create_session(&user.id).await
    }

    /// Deletes the associated session, if it exists
    pub async fn logout(&self, token: &str) -> Result<(), DatabaseError> {
        self.db.delete_session_by_token(token).await
    }

    /// Returns a session if it exists
    pub async fn session(&self, token: &str) -> Result<SessionData, DatabaseError> {
        self.db.session_by_token(token).await
    }

    pub async fn user_by_id(&self, user_id: &str) -> Result<UserData, DatabaseError> {
        self.db.user_by_id(user_id).await
    }

    /// All registered users, for the owner's user listing
    pub async fn list_users(&self) -> Result<Vec<UserData>, DatabaseError> {
        self.db.list_users().await
    }

    /// Grants or revokes patchbay access for a user.
    ///
    /// The owner's access is implicit and immutable, so a grant or revoke
    /// targeting the owner leaves the record untouched.
    pub async fn set_patchbay_access(
        &self,
        user_id: &str,
        value: bool,
    ) -> Result<UserData, DatabaseError> {
        let user = self.db.user_by_id(user_id).await?;

        if user.is_owner {
            return Ok(user);
        }

        self.db.set_patchbay_access(user_id, value).await
    }

    async fn create_session(&self, user_id: &str) -> Result<SessionData, AuthError> {
        let new_session = NewSession {
            token: random_string(TOKEN_LENGTH),
            user_id: user_id.to_string(),
        };

        self.db
            .create_session(new_session)
            .await
            .map_err(AuthError::Db)
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewPlainUser {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteDatabase;

    async fn auth() -> Auth<SqliteDatabase> {
        let db = Arc::new(SqliteDatabase::in_memory().await.unwrap());
        Auth::new(&db)
    }

    fn plain_user(username: &str, password: &str) -> NewPlainUser {
        NewPlainUser {
            username: username.to_string(),
            password: password.to_string(),
            email: None,
        }
    }

    #[tokio::test]
    async fn first_registration_becomes_owner() {
        let auth = auth().await;

        let alice = auth.register(plain_user("alice", "s3cret")).await.unwrap();
        let bob = auth.register(plain_user("bob", "hunter2")).await.unwrap();

        assert!(alice.user.is_owner);
        assert!(alice.user.has_patchbay_access);
        assert!(!bob.user.is_owner);
        assert!(!bob.user.has_patchbay_access);
    }

    #[tokio::test]
    async fn register_then_login_round_trips() {
        let auth = auth().await;
        auth.register(plain_user("alice", "s3cret")).await.unwrap();

        let session = auth
            .login(Credentials {
                username: "alice".to_string(),
                password: "s3cret".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(session.user.username, "alice");
        assert_eq!(session.token.len(), TOKEN_LENGTH);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let auth = auth().await;
        auth.register(plain_user("alice", "s3cret")).await.unwrap();

        let result = auth
            .login(Credentials {
                username: "alice".to_string(),
                password: "guess".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let auth = auth().await;
        auth.register(plain_user("alice", "s3cret")).await.unwrap();

        let result = auth.register(plain_user("alice", "other")).await;

        assert!(matches!(result, Err(AuthError::NameTaken(name)) if name == "alice"));
    }

    #[tokio::test]
    async fn stored_password_is_not_plaintext() {
        let auth = auth().await;
        let session = auth.register(plain_user("alice", "s3cret")).await.unwrap();

        assert_ne!(session.user.password, "s3cret");
        assert!(session.user.password.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn session_resolves_to_its_user() {
        let auth = auth().await;
        let session = auth.register(plain_user("alice", "s3cret")).await.unwrap();

        let resolved = auth.session(&session.token).await.unwrap();
        assert_eq!(resolved.user.id, session.user.id);

        let unknown = auth.session("not-a-token").await;
        assert!(matches!(unknown, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    async fn logout_invalidates_the_token() {
        let auth = auth().await;
        let session = auth.register(plain_user("alice", "s3cret")).await.unwrap();

        auth.logout(&session.token).await.unwrap();

        assert!(auth.session(&session.token).await.is_err());
    }

    #[tokio::test]
    async fn owner_patchbay_access_is_immutable() {
        let auth = auth().await;
        let alice = auth.register(plain_user("alice", "s3cret")).await.unwrap();
        let bob = auth.register(plain_user("bob", "hunter2")).await.unwrap();

        // Granting to a regular user works both ways
        let bob_user = auth.set_patchbay_access(&bob.user.id, true).await.unwrap();
        assert!(bob_user.has_patchbay_access);
        let bob_user = auth.set_patchbay_access(&bob.user.id, false).await.unwrap();
        assert!(!bob_user.has_patchbay_access);

        // Revoking from the owner is a no-op
        let owner = auth.set_patchbay_access(&alice.user.id, false).await.unwrap();
        assert!(owner.is_owner);
        assert!(owner.can_patch());
    }
}
