pub mod session;

pub use session::{create_session, delete_session, resolve_session, SessionUser};

use rusqlite::{params, OptionalExtension};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::authority::{Actor, Role};
use crate::db::{insert_outcome, rows, with_conn, InsertOutcome, StoreError};
use crate::ids::UserId;
use crate::state::DbPool;

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 32;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 72;
const MAX_DISPLAY_NAME_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Username is already taken")]
    UsernameTaken,

    #[error("{0}")]
    Validation(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// A freshly issued session
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: SessionUser,
}

/// Password accounts and cookie sessions
pub struct Authenticator {
    pool: DbPool,
    timeout: Duration,
    bcrypt_cost: u32,
    session_hours: u64,
}

impl Authenticator {
    pub fn new(pool: DbPool, timeout: Duration, bcrypt_cost: u32, session_hours: u64) -> Self {
        Self {
            pool,
            timeout,
            bcrypt_cost,
            session_hours,
        }
    }

    pub async fn signup(&self, req: SignupRequest) -> Result<Session, AuthError> {
        let username = validate_username(&req.username)?;
        validate_password(&req.password)?;
        let display_name = req
            .display_name
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if display_name
            .as_ref()
            .is_some_and(|d| d.chars().count() > MAX_DISPLAY_NAME_LEN)
        {
            return Err(AuthError::Validation(format!(
                "Display name must be {} characters or less",
                MAX_DISPLAY_NAME_LEN
            )));
        }

        let password_hash = hash_password(req.password, self.bcrypt_cost).await?;
        let id = UserId::generate();
        let now = rows::timestamp(chrono::Utc::now());

        let row_id = id.clone();
        let row_username = username.clone();
        let outcome = with_conn(&self.pool, self.timeout, move |conn| {
            insert_outcome(conn.execute(
                "INSERT INTO users (id, username, display_name, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![row_id.as_str(), row_username, display_name, password_hash, now],
            ))
        })
        .await?;

        if outcome == InsertOutcome::Duplicate {
            return Err(AuthError::UsernameTaken);
        }

        tracing::info!(user_id = %id, username, "Account created");
        self.issue(Actor::new(id.as_str(), Role::User), username).await
    }

    pub async fn login(&self, req: LoginRequest) -> Result<Session, AuthError> {
        let username = req.username.trim().to_lowercase();
        let lookup = username.clone();
        let row: Option<(String, Option<String>, String, bool)> =
            with_conn(&self.pool, self.timeout, move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, password_hash, role, is_blocked FROM users
                         WHERE username = ?1 AND deleted_at IS NULL",
                        params![lookup],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                    )
                    .optional()?)
            })
            .await?;

        let (id, hash, role, is_blocked) = row.ok_or(AuthError::InvalidCredentials)?;
        let hash = hash.ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(req.password, hash).await? {
            tracing::info!(username, "Failed login");
            return Err(AuthError::InvalidCredentials);
        }

        let actor = Actor {
            id: UserId::new(id),
            role: rows::parse_enum("role", &role, Role::parse)?,
            is_blocked,
        };
        self.issue(actor, username).await
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        Ok(delete_session(&self.pool, self.timeout, token).await?)
    }

    pub async fn resolve(&self, token: &str) -> Result<Option<SessionUser>, AuthError> {
        Ok(resolve_session(&self.pool, self.timeout, token).await?)
    }

    async fn issue(&self, actor: Actor, username: String) -> Result<Session, AuthError> {
        let token = create_session(&self.pool, self.timeout, &actor.id, self.session_hours).await?;
        Ok(Session {
            token,
            user: SessionUser { actor, username },
        })
    }
}

/// Usernames are stored lowercase
fn validate_username(raw: &str) -> Result<String, AuthError> {
    let username = raw.trim().to_lowercase();
    let len = username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(AuthError::Validation(format!(
            "Username must be {} to {} characters",
            MIN_USERNAME_LEN, MAX_USERNAME_LEN
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(AuthError::Validation(
            "Username may only contain letters, digits, '_', '-' and '.'".into(),
        ));
    }
    Ok(username)
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    // bcrypt ignores everything past 72 bytes
    if password.len() < MIN_PASSWORD_LEN || password.len() > MAX_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be {} to {} bytes",
            MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}

async fn hash_password(password: String, cost: u32) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

async fn verify_password(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .map_err(|e| AuthError::Hashing(e.to_string()))
}
