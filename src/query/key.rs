//! Canonical cache identities for logical queries.
//!
//! Two filters with the same semantic content must land on the same key no
//! matter how they were built; any semantic difference must produce a
//! different key. The canonical form is a JSON object rendered with fields
//! in one fixed order, so it doubles as a debuggable string.

use serde_json::Value;

use crate::models::PacketSource;

use super::filter::{format_timestamp, FilterSet};

/// Names the logical query a filter belongs to. Part of the key, so two
/// different queries over identical filters never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Measurements,
    Track,
    CoverageBins,
    Events,
    Sessions,
    TimelineSummary,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Measurements => "measurements",
            QueryKind::Track => "track",
            QueryKind::CoverageBins => "coverage-bins",
            QueryKind::Events => "events",
            QueryKind::Sessions => "sessions",
            QueryKind::TimelineSummary => "timeline-summary",
        }
    }

    /// Optional backend capabilities: a 404 here means "not available for
    /// this deployment", not "bad request", and latches the kind off.
    pub fn is_optional_capability(&self) -> bool {
        matches!(self, QueryKind::CoverageBins | QueryKind::TimelineSummary)
    }

    /// Whether this kind participates in interval polling at all. The event
    /// stream is pager-driven and never polled.
    pub fn poll_eligible(&self) -> bool {
        !matches!(self, QueryKind::Events)
    }
}

/// Cache identity: discriminator plus the canonical rendering of a
/// [`FilterSet`]. Equality and hashing follow the canonical string, so the
/// key is usable directly as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    kind: QueryKind,
    canon: String,
    // Scope ids kept out-of-band for mutation invalidation; they are also
    // embedded in `canon`, so deriving Eq/Hash over everything stays
    // consistent.
    device_id: Option<String>,
    session_id: Option<String>,
}

/// Field order of the canonical rendering. Changing this order changes
/// every key, so it is part of the cache contract.
const FIELD_ORDER: [&str; 11] = [
    "deviceId",
    "sessionId",
    "from",
    "to",
    "bbox",
    "gatewayId",
    "receiverId",
    "limit",
    "sampleFactor",
    "source",
    "q",
];

impl QueryKey {
    /// Pure and idempotent: the same `(kind, filter)` always renders the
    /// same key, regardless of how the filter's fields were populated.
    pub fn canonical(kind: QueryKind, filter: &FilterSet) -> Self {
        let values = [
            opt_string(filter.device_id.as_deref()),
            opt_string(filter.session_id.as_deref()),
            filter
                .from_time
                .map(|at| Value::String(format_timestamp(at)))
                .unwrap_or(Value::Null),
            filter
                .to_time
                .map(|at| Value::String(format_timestamp(at)))
                .unwrap_or(Value::Null),
            filter
                .bounding_box
                .as_ref()
                .map(|bbox| Value::String(bbox.to_param()))
                .unwrap_or(Value::Null),
            opt_string(filter.gateway_id.as_deref()),
            opt_string(filter.receiver_id.as_deref()),
            filter.limit.map(Value::from).unwrap_or(Value::Null),
            filter.sample_factor.map(Value::from).unwrap_or(Value::Null),
            filter
                .source
                .map(|source: PacketSource| Value::String(source.as_str().to_string()))
                .unwrap_or(Value::Null),
            opt_string(filter.search.as_deref()),
        ];

        let mut canon = String::new();
        canon.push('{');
        for (index, (name, value)) in FIELD_ORDER.iter().zip(values.iter()).enumerate() {
            if index > 0 {
                canon.push(',');
            }
            canon.push('"');
            canon.push_str(name);
            canon.push_str("\":");
            canon.push_str(&value.to_string());
        }
        canon.push('}');

        Self {
            kind,
            canon,
            device_id: filter.device_id.clone(),
            session_id: filter.session_id.clone(),
        }
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn canonical_str(&self) -> &str {
        &self.canon
    }

    /// Could a mutation to this device/session affect this key's results?
    /// An unscoped key (no device and no session) is conservatively treated
    /// as affected by everything.
    pub fn covers_scope(&self, device_id: Option<&str>, session_id: Option<&str>) -> bool {
        if self.device_id.is_none() && self.session_id.is_none() {
            return true;
        }
        let device_hit = match (self.device_id.as_deref(), device_id) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        };
        let session_hit = match (self.session_id.as_deref(), session_id) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        };
        device_hit || session_hit
    }
}

fn opt_string(value: Option<&str>) -> Value {
    value
        .map(|s| Value::String(s.to_string()))
        .unwrap_or(Value::Null)
}
