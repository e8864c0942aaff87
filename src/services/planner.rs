use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{trip::Trip, whiteboard::WhiteboardVersion},
    state::AppState,
};

/// Result of a save: the trip row plus the version written for it, if a
/// snapshot was part of the save.
#[derive(Debug, Clone, Serialize)]
pub struct SavedTrip {
    pub trip: Trip,
    pub version: Option<WhiteboardVersion>,
}

/// A trip together with its current whiteboard state. `snapshot` is `None`
/// when the trip has never had a whiteboard saved.
#[derive(Debug, Clone, Serialize)]
pub struct TripView {
    pub trip: Trip,
    pub snapshot: Option<Value>,
}

/// Creates a trip and, if a snapshot was supplied, its first whiteboard
/// version. The trip write is sequenced first; if the snapshot append then
/// fails, the trip is deliberately left in place so the caller can retry the
/// whiteboard save against the existing trip id.
pub async fn create_and_save(
    state: &AppState,
    current: &CurrentUser,
    name: &str,
    snapshot: Option<Value>,
) -> Result<SavedTrip, AppError> {
    let user = current.require_user()?;
    let trip = state.trips.create(&user.uuid, name).await?;
    info!(trip_id = %trip.id, "trip created");

    let version = match snapshot {
        Some(snapshot) => match state.whiteboards.append(&trip, snapshot).await {
            Ok(version) => Some(version),
            Err(err) => {
                error!(trip_id = %trip.id, "whiteboard save failed after trip creation: {err}");
                return Err(AppError::SnapshotNotSaved {
                    trip_id: trip.id.clone(),
                });
            }
        },
        None => None,
    };

    Ok(SavedTrip { trip, version })
}

/// Renames the trip (refreshing `updated_at` either way) and appends a new
/// whiteboard version when a snapshot was supplied. The two step failures are
/// reported distinctly: an ownership or rename failure surfaces as-is, a
/// snapshot failure after a committed rename surfaces as `SnapshotNotSaved`.
pub async fn update_and_save(
    state: &AppState,
    current: &CurrentUser,
    trip_id: &str,
    name: Option<&str>,
    snapshot: Option<Value>,
) -> Result<SavedTrip, AppError> {
    let user = current.require_user()?;
    let trip = state.trips.update(trip_id, &user.uuid, name).await?;

    let version = match snapshot {
        Some(snapshot) => match state.whiteboards.append(&trip, snapshot).await {
            Ok(version) => Some(version),
            Err(err) => {
                error!(trip_id = %trip.id, "whiteboard save failed after trip update: {err}");
                return Err(AppError::SnapshotNotSaved {
                    trip_id: trip.id.clone(),
                });
            }
        },
        None => None,
    };

    info!(trip_id = %trip.id, "trip saved");
    Ok(SavedTrip { trip, version })
}

pub async fn load(
    state: &AppState,
    current: &CurrentUser,
    trip_id: &str,
) -> Result<TripView, AppError> {
    let user = current.require_user()?;
    let trip = state.trips.get(trip_id, &user.uuid).await?;
    let version = state.whiteboards.latest(&trip).await?;
    Ok(TripView {
        trip,
        snapshot: version.map(|v| v.snapshot),
    })
}

pub async fn list(state: &AppState, current: &CurrentUser) -> Result<Vec<Trip>, AppError> {
    let user = current.require_user()?;
    state.trips.list(&user.uuid).await
}

pub async fn history(
    state: &AppState,
    current: &CurrentUser,
    trip_id: &str,
) -> Result<Vec<WhiteboardVersion>, AppError> {
    let user = current.require_user()?;
    let trip = state.trips.get(trip_id, &user.uuid).await?;
    state.whiteboards.history(&trip).await
}

pub async fn delete(
    state: &AppState,
    current: &CurrentUser,
    trip_id: &str,
) -> Result<(), AppError> {
    let user = current.require_user()?;
    state.trips.delete(trip_id, &user.uuid).await?;
    info!(trip_id, "trip deleted");
    Ok(())
}
