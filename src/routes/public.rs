use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::{Deserialize, Serialize};

use crate::{
    auth::{self, AuthenticatedUser, CurrentUser},
    error::AppError,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[derive(Deserialize)]
struct CredentialsRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct SessionUser {
    uuid: String,
    email: String,
}

impl From<AuthenticatedUser> for SessionUser {
    fn from(user: AuthenticatedUser) -> Self {
        Self {
            uuid: user.uuid,
            email: user.email,
        }
    }
}

async fn register(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(body): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = auth::register_user(&state, &body.email, &body.password).await?;
    let session_id = auth::create_session(&state, user.id).await?;
    Ok((
        StatusCode::CREATED,
        auth::apply_session_cookie(jar, &session_id),
        Json(SessionUser::from(user)),
    ))
}

async fn login(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(body): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = auth::authenticate_user(&state, &body.email, &body.password).await?;
    let session_id = auth::create_session(&state, user.id).await?;
    Ok((
        auth::apply_session_cookie(jar, &session_id),
        Json(SessionUser::from(user)),
    ))
}

async fn logout(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, AppError> {
    if let Some(cookie) = jar.get(auth::SESSION_COOKIE) {
        auth::destroy_session(&state, cookie.value()).await?;
    }
    Ok((auth::clear_session_cookie(jar), StatusCode::NO_CONTENT))
}

async fn me(current: CurrentUser) -> Result<Json<SessionUser>, AppError> {
    let user = current.require_user()?;
    Ok(Json(SessionUser::from(user.clone())))
}
