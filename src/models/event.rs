use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the cursor-paginated event stream (joins, drops, alerts,
/// configuration changes). Ordering is server-determined and preserved
/// verbatim by the pager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub device_id: Option<String>,
    pub kind: String,
    pub detail: Option<String>,
}
