use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::models::PacketSource;

/// Geographic bounding box, `minLon,minLat,maxLon,maxLat` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.min_lon > self.max_lon || self.min_lat > self.max_lat {
            return Err(FilterError::InvalidBoundingBox(
                "min corner is past max corner".into(),
            ));
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 {
            return Err(FilterError::InvalidBoundingBox(
                "latitude out of range".into(),
            ));
        }
        if self.min_lon < -180.0 || self.max_lon > 180.0 {
            return Err(FilterError::InvalidBoundingBox(
                "longitude out of range".into(),
            ));
        }
        Ok(())
    }

    /// Comma-joined 4-tuple in `minLon,minLat,maxLon,maxLat` order.
    pub fn to_param(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

/// Optional scoping/query parameters for a logical query.
///
/// Absence of a field is distinct from an empty or zero value: absent fields
/// are omitted from the query string entirely and normalize to a single
/// null marker in the cache key. A new `FilterSet` means a new cache
/// identity; instances are captured immutably per request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    pub device_id: Option<String>,
    pub session_id: Option<String>,
    pub from_time: Option<DateTime<Utc>>,
    pub to_time: Option<DateTime<Utc>>,
    pub bounding_box: Option<BoundingBox>,
    pub gateway_id: Option<String>,
    pub receiver_id: Option<String>,
    pub limit: Option<u32>,
    pub sample_factor: Option<u32>,
    pub source: Option<PacketSource>,
    pub search: Option<String>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, id: impl Into<String>) -> Self {
        self.device_id = Some(id.into());
        self
    }

    pub fn session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn from_time(mut self, at: DateTime<Utc>) -> Self {
        self.from_time = Some(at);
        self
    }

    pub fn to_time(mut self, at: DateTime<Utc>) -> Self {
        self.to_time = Some(at);
        self
    }

    /// Accepts an RFC 3339 string; parses into the same canonical instant a
    /// `DateTime<Utc>` setter would produce, so both forms normalize
    /// identically.
    pub fn from_time_str(mut self, at: &str) -> Result<Self, FilterError> {
        self.from_time = Some(parse_timestamp(at)?);
        Ok(self)
    }

    pub fn to_time_str(mut self, at: &str) -> Result<Self, FilterError> {
        self.to_time = Some(parse_timestamp(at)?);
        Ok(self)
    }

    pub fn bounding_box(mut self, bbox: BoundingBox) -> Self {
        self.bounding_box = Some(bbox);
        self
    }

    pub fn gateway(mut self, id: impl Into<String>) -> Self {
        self.gateway_id = Some(id.into());
        self
    }

    pub fn receiver(mut self, id: impl Into<String>) -> Self {
        self.receiver_id = Some(id.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sample_factor(mut self, factor: u32) -> Self {
        self.sample_factor = Some(factor);
        self
    }

    pub fn source(mut self, source: PacketSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn search(mut self, query: impl Into<String>) -> Self {
        self.search = Some(query.into());
        self
    }

    /// Local validation, run before any request is issued. A failure here
    /// never reaches the network.
    pub fn validate(&self) -> Result<(), FilterError> {
        if let (Some(from), Some(to)) = (self.from_time, self.to_time) {
            if from > to {
                return Err(FilterError::InvalidTimeRange);
            }
        }
        if let Some(bbox) = &self.bounding_box {
            bbox.validate()?;
        }
        Ok(())
    }

    /// Does this filter carry at least one scoping identifier?
    pub fn has_scope(&self) -> bool {
        self.device_id.is_some() || self.session_id.is_some()
    }

    /// Width of the effective time range. `None` means the range is
    /// unbounded (live tail) — only a filter with both ends set has a width.
    pub fn time_range_width(&self) -> Option<chrono::Duration> {
        match (self.from_time, self.to_time) {
            (Some(from), Some(to)) => Some(to - from),
            _ => None,
        }
    }

    /// Renders the filter as URL query parameters per the backend contract:
    /// absent fields omitted, dates as UTC RFC 3339, bounding box as a
    /// comma-joined 4-tuple.
    pub fn to_query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        push_param(&mut params, "deviceId", self.device_id.as_deref());
        push_param(&mut params, "sessionId", self.session_id.as_deref());
        if let Some(from) = self.from_time {
            params.push(("from".into(), format_timestamp(from)));
        }
        if let Some(to) = self.to_time {
            params.push(("to".into(), format_timestamp(to)));
        }
        if let Some(bbox) = &self.bounding_box {
            params.push(("bbox".into(), bbox.to_param()));
        }
        push_param(&mut params, "gatewayId", self.gateway_id.as_deref());
        push_param(&mut params, "receiverId", self.receiver_id.as_deref());
        if let Some(limit) = self.limit {
            params.push(("limit".into(), limit.to_string()));
        }
        if let Some(factor) = self.sample_factor {
            params.push(("sampleFactor".into(), factor.to_string()));
        }
        if let Some(source) = self.source {
            params.push(("source".into(), source.as_str().to_string()));
        }
        push_param(&mut params, "q", self.search.as_deref());
        params
    }
}

fn push_param(params: &mut Vec<(String, String)>, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        params.push((name.into(), value.to_string()));
    }
}

/// One fixed textual form for all date-valued parameters: UTC RFC 3339 with
/// millisecond precision.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, FilterError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| FilterError::InvalidTimestamp(value.to_string()))
}
