use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary row for a recording session, including the point-time bounds the
/// playback engine clamps against. Bounds are absent for empty sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub device_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub point_count: u64,
    pub first_point_ms: Option<i64>,
    pub last_point_ms: Option<i64>,
}
