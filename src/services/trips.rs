use chrono::Utc;

use crate::{db::DbPool, error::AppError, models::trip::Trip};

/// Trip records, scoped to their owner.
///
/// Every query carries `owner_uuid` in its WHERE clause, so a trip owned by
/// another user behaves exactly like a missing trip. Callers holding a `Trip`
/// value obtained here have therefore already passed the ownership check.
#[derive(Clone)]
pub struct TripStore {
    db: DbPool,
}

impl TripStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Name validation is a presentation concern; any text is accepted here.
    pub async fn create(&self, owner_uuid: &str, name: &str) -> Result<Trip, AppError> {
        let trip = Trip::new(owner_uuid, name);
        sqlx::query(
            "INSERT INTO trips (id, owner_uuid, name, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&trip.id)
        .bind(&trip.owner_uuid)
        .bind(&trip.name)
        .bind(trip.created_at)
        .bind(trip.updated_at)
        .execute(&self.db)
        .await?;
        Ok(trip)
    }

    pub async fn get(&self, id: &str, owner_uuid: &str) -> Result<Trip, AppError> {
        sqlx::query_as::<_, Trip>(
            "SELECT id, owner_uuid, name, created_at, updated_at \
             FROM trips WHERE id = ? AND owner_uuid = ?",
        )
        .bind(id)
        .bind(owner_uuid)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::NotFound)
    }

    pub async fn list(&self, owner_uuid: &str) -> Result<Vec<Trip>, AppError> {
        let trips = sqlx::query_as::<_, Trip>(
            "SELECT id, owner_uuid, name, created_at, updated_at \
             FROM trips WHERE owner_uuid = ? ORDER BY updated_at DESC",
        )
        .bind(owner_uuid)
        .fetch_all(&self.db)
        .await?;
        Ok(trips)
    }

    /// Renames the trip when `name` is given; `updated_at` is refreshed in
    /// the same write either way.
    pub async fn update(
        &self,
        id: &str,
        owner_uuid: &str,
        name: Option<&str>,
    ) -> Result<Trip, AppError> {
        sqlx::query_as::<_, Trip>(
            "UPDATE trips SET name = COALESCE(?, name), updated_at = ? \
             WHERE id = ? AND owner_uuid = ? \
             RETURNING id, owner_uuid, name, created_at, updated_at",
        )
        .bind(name)
        .bind(Utc::now())
        .bind(id)
        .bind(owner_uuid)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::NotFound)
    }

    /// Deletes the trip and its whole whiteboard history in one transaction,
    /// so a partial cascade cannot be observed.
    pub async fn delete(&self, id: &str, owner_uuid: &str) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;

        let deleted = sqlx::query("DELETE FROM trips WHERE id = ? AND owner_uuid = ?")
            .bind(id)
            .bind(owner_uuid)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }

        sqlx::query("DELETE FROM whiteboard_versions WHERE trip_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
