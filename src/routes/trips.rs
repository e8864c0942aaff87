use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    auth::CurrentUser,
    error::AppError,
    services::planner,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_trips).post(create_trip))
        .route(
            "/:id",
            get(load_trip).put(update_trip).delete(delete_trip),
        )
        .route("/:id/versions", get(trip_versions))
}

async fn list_trips(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let trips = planner::list(&state, &current).await?;
    Ok(Json(trips))
}

#[derive(Deserialize)]
struct CreateTripRequest {
    name: String,
    snapshot: Option<Value>,
}

async fn create_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(body): Json<CreateTripRequest>,
) -> Result<impl IntoResponse, AppError> {
    let saved = planner::create_and_save(&state, &current, &body.name, body.snapshot).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn load_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = planner::load(&state, &current, &id).await?;
    Ok(Json(view))
}

#[derive(Deserialize)]
struct UpdateTripRequest {
    name: Option<String>,
    snapshot: Option<Value>,
}

async fn update_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateTripRequest>,
) -> Result<impl IntoResponse, AppError> {
    let saved =
        planner::update_and_save(&state, &current, &id, body.name.as_deref(), body.snapshot)
            .await?;
    Ok(Json(saved))
}

async fn trip_versions(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let versions = planner::history(&state, &current, &id).await?;
    Ok(Json(versions))
}

async fn delete_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    planner::delete(&state, &current, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
