use chrono::Utc;
use serde_json::Value;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        trip::Trip,
        whiteboard::{WhiteboardVersion, WhiteboardVersionRow},
    },
};

/// Append-only whiteboard snapshot history.
///
/// Saves never overwrite: each one inserts a new version, and the "current"
/// whiteboard is whichever version has the greatest `created_at` (ties go to
/// the highest id). Concurrent saves of the same trip therefore cannot
/// corrupt anything; the losing edit stays in history.
///
/// Methods take an owner-authorized `Trip` rather than a bare id, so the
/// authorization check performed by `TripStore` cannot be skipped.
#[derive(Clone)]
pub struct WhiteboardStore {
    db: DbPool,
}

impl WhiteboardStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn append(
        &self,
        trip: &Trip,
        snapshot: Value,
    ) -> Result<WhiteboardVersion, AppError> {
        let created_at = Utc::now();
        let raw = serde_json::to_string(&snapshot).map_err(|err| AppError::Other(err.into()))?;

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO whiteboard_versions (trip_id, snapshot, created_at) \
             VALUES (?, ?, ?) RETURNING id",
        )
        .bind(&trip.id)
        .bind(&raw)
        .bind(created_at)
        .fetch_one(&self.db)
        .await?;

        Ok(WhiteboardVersion {
            id,
            trip_id: trip.id.clone(),
            snapshot,
            created_at,
        })
    }

    /// `Ok(None)` means the trip has never been saved; that is a normal
    /// state (a brand-new trip has a blank canvas), not an error.
    pub async fn latest(&self, trip: &Trip) -> Result<Option<WhiteboardVersion>, AppError> {
        let row: Option<WhiteboardVersionRow> = sqlx::query_as(
            "SELECT id, trip_id, snapshot, created_at FROM whiteboard_versions \
             WHERE trip_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(&trip.id)
        .fetch_optional(&self.db)
        .await?;

        row.map(WhiteboardVersion::try_from).transpose()
    }

    /// Full version history, newest first.
    pub async fn history(&self, trip: &Trip) -> Result<Vec<WhiteboardVersion>, AppError> {
        let rows: Vec<WhiteboardVersionRow> = sqlx::query_as(
            "SELECT id, trip_id, snapshot, created_at FROM whiteboard_versions \
             WHERE trip_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(&trip.id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(WhiteboardVersion::try_from).collect()
    }
}
