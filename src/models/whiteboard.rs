use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::error::AppError;

/// One persisted whiteboard snapshot, part of a trip's append-only history.
///
/// The snapshot is produced by the canvas engine and is opaque to this
/// service: it is stored and returned verbatim, never inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhiteboardVersion {
    pub id: i64,
    pub trip_id: String,
    pub snapshot: Value,
    pub created_at: DateTime<Utc>,
}

/// Raw row shape; the snapshot column holds serialized JSON text.
#[derive(Debug, FromRow)]
pub struct WhiteboardVersionRow {
    pub id: i64,
    pub trip_id: String,
    pub snapshot: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<WhiteboardVersionRow> for WhiteboardVersion {
    type Error = AppError;

    fn try_from(row: WhiteboardVersionRow) -> Result<Self, Self::Error> {
        let snapshot: Value =
            serde_json::from_str(&row.snapshot).map_err(|err| AppError::Other(err.into()))?;
        Ok(Self {
            id: row.id,
            trip_id: row.trip_id,
            snapshot,
            created_at: row.created_at,
        })
    }
}
