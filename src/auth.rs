use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{session::Session, user::User},
    state::AppState,
};

pub const SESSION_COOKIE: &str = "tripboard_session";

const SESSION_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub uuid: String,
    pub email: String,
}

impl From<User> for AuthenticatedUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            uuid: user.uuid,
            email: user.email,
        }
    }
}

/// The principal attached to the current request, if any.
///
/// Resolved from the session cookie on extraction; an absent or expired
/// session yields `CurrentUser(None)` rather than an error so that handlers
/// decide via `require_user` whether the operation is protected.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let jar = PrivateCookieJar::from_headers(&parts.headers, state.cookie_key.clone());
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(Self(None));
        };
        let user = resolve_session(&state, cookie.value()).await?;
        Ok(Self(user))
    }
}

impl CurrentUser {
    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }
}

pub async fn register_user(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest(
            "a valid email address is required".into(),
        ));
    }
    if password.len() < 8 {
        return Err(AppError::BadRequest(
            "the password must be at least 8 characters long".into(),
        ));
    }

    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(
            "an account with this email already exists".into(),
        ));
    }

    let password_hash = hash_password(password)?;
    let uuid = Uuid::new_v4().to_string();
    let created_at = Utc::now();

    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO users (uuid, email, password_hash, created_at) \
         VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(&uuid)
    .bind(&email)
    .bind(&password_hash)
    .bind(created_at)
    .fetch_one(&state.db)
    .await?;

    Ok(AuthenticatedUser { id, uuid, email })
}

pub async fn authenticate_user(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<AuthenticatedUser, AppError> {
    let email = email.trim().to_lowercase();
    let user: Option<User> = sqlx::query_as(
        "SELECT id, uuid, email, password_hash, created_at, last_login_at \
         FROM users WHERE email = ?",
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await?;

    // Unknown email and wrong password are indistinguishable to the caller.
    let user = user.ok_or(AppError::Unauthorized)?;
    verify_password(&user.password_hash, password)?;

    sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(user.id)
        .execute(&state.db)
        .await?;

    Ok(user.into())
}

pub async fn create_session(state: &AppState, user_id: i64) -> Result<String, AppError> {
    let now = Utc::now();
    let session = Session {
        id: Uuid::new_v4().to_string(),
        user_id,
        created_at: now,
        last_seen_at: now,
        expires_at: Some(now + Duration::days(SESSION_TTL_DAYS)),
    };

    sqlx::query(
        "INSERT INTO sessions (id, user_id, created_at, last_seen_at, expires_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(session.created_at)
    .bind(session.last_seen_at)
    .bind(session.expires_at)
    .execute(&state.db)
    .await?;

    Ok(session.id)
}

pub async fn destroy_session(state: &AppState, session_id: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(session_id)
        .execute(&state.db)
        .await?;
    Ok(())
}

pub fn apply_session_cookie(jar: PrivateCookieJar, session_id: &str) -> PrivateCookieJar {
    let cookie = Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    jar.add(cookie)
}

pub fn clear_session_cookie(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build())
}

#[derive(Debug, FromRow)]
struct SessionUserRow {
    session_id: String,
    expires_at: Option<DateTime<Utc>>,
    user_id: i64,
    uuid: String,
    email: String,
}

async fn resolve_session(
    state: &AppState,
    session_id: &str,
) -> Result<Option<AuthenticatedUser>, AppError> {
    let row: Option<SessionUserRow> = sqlx::query_as(
        "SELECT s.id AS session_id, s.expires_at, u.id AS user_id, u.uuid, u.email \
         FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.id = ?",
    )
    .bind(session_id)
    .fetch_optional(&state.db)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    if let Some(expires_at) = row.expires_at {
        if expires_at <= Utc::now() {
            destroy_session(state, &row.session_id).await?;
            return Ok(None);
        }
    }

    sqlx::query("UPDATE sessions SET last_seen_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(&row.session_id)
        .execute(&state.db)
        .await?;

    Ok(Some(AuthenticatedUser {
        id: row.user_id,
        uuid: row.uuid,
        email: row.email,
    }))
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AppError::Other(anyhow::anyhow!("password hashing failed: {err}")))?;
    Ok(hash.to_string())
}

fn verify_password(stored_hash: &str, password: &str) -> Result<(), AppError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|err| AppError::Other(anyhow::anyhow!("stored password hash invalid: {err}")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::Unauthorized)
}
