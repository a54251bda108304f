use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Error as SqlxError, Row, SqlitePool,
};

use crate::{
    Database, DatabaseError, IntoDatabaseError, NewSession, NewUser, Result, SessionData, UserData,
};

/// The embedded SQLite store backing users and sessions.
///
/// Rooms and port state are deliberately not persisted; they are rebuilt
/// from scratch on every startup.
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Opens (and creates, if missing) the database file at `path`.
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| e.any())?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// An isolated in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self> {
        // A single connection keeps every query on the same in-memory db
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| e.any())?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password TEXT NOT NULL,
                email TEXT,
                created_at TEXT NOT NULL,
                is_owner INTEGER NOT NULL DEFAULT 0,
                has_patchbay_access INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(())
    }
}

fn user_from_row(row: &SqliteRow) -> UserData {
    UserData {
        id: row.get("id"),
        username: row.get("username"),
        password: row.get("password"),
        email: row.get("email"),
        created_at: row.get("created_at"),
        is_owner: row.get("is_owner"),
        has_patchbay_access: row.get("has_patchbay_access"),
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn user_by_id(&self, user_id: &str) -> Result<UserData> {
        sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map(|row| user_from_row(&row))
            .map_err(|e| e.not_found_or("user", user_id))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        sqlx::query("SELECT * FROM users WHERE username = ?1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map(|row| user_from_row(&row))
            .map_err(|e| e.not_found_or("user", username))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let taken = sqlx::query("SELECT id FROM users WHERE username = ?1")
            .bind(&new_user.username)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        if taken.is_some() {
            return Err(DatabaseError::Conflict {
                resource: "user",
                field: "username",
                value: new_user.username,
            });
        }

        // The first user to ever register owns the deployment
        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        let is_owner = user_count == 0;

        sqlx::query(
            "INSERT INTO users (id, username, password, email, created_at, is_owner, has_patchbay_access)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&new_user.id)
        .bind(&new_user.username)
        .bind(&new_user.password)
        .bind(&new_user.email)
        .bind(Utc::now())
        .bind(is_owner)
        .bind(is_owner)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.conflict_or_any("user", "username", &new_user.username))?;

        tx.commit().await.map_err(|e| e.any())?;

        self.user_by_id(&new_user.id).await
    }

    async fn set_patchbay_access(&self, user_id: &str, value: bool) -> Result<UserData> {
        // Ensure user exists
        let _ = self.user_by_id(user_id).await?;

        sqlx::query("UPDATE users SET has_patchbay_access = ?1 WHERE id = ?2")
            .bind(value)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.user_by_id(user_id).await
    }

    async fn list_users(&self) -> Result<Vec<UserData>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(rows.iter().map(user_from_row).collect())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row = sqlx::query(
            "SELECT
                sessions.token,
                sessions.created_at AS session_created_at,
                users.*
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = ?1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("session", "token"))?;

        Ok(SessionData {
            token: row.get("token"),
            created_at: row.get("session_created_at"),
            user: user_from_row(&row),
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        sqlx::query("INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(&new_session.token)
            .bind(&new_session.user_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| e.conflict_or_any("session", "token", &new_session.token))?;

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        // Ensure session exists
        let _ = self.session_by_token(token).await?;

        sqlx::query("DELETE FROM sessions WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn close(&self) {
        self.pool.close().await
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier: identifier.to_string(),
            },
            e => e.any(),
        }
    }

    fn conflict_or_any(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> DatabaseError {
        let is_unique_violation = self
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false);

        if is_unique_violation {
            DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }
        } else {
            self.any()
        }
    }
}
