use serde::{Deserialize, Serialize};

/// One page of a cursor-paginated endpoint. A missing `nextCursor` means
/// end of stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Normalized list response. Some endpoints answer with a bare JSON array,
/// others with `{items, count}`; the transport folds both into this shape
/// before anything downstream sees them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEnvelope<T> {
    pub items: Vec<T>,
    pub count: Option<u64>,
}

impl<T> From<Vec<T>> for ListEnvelope<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items, count: None }
    }
}
