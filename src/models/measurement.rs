use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Radio network a packet was heard on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PacketSource {
    Lorawan,
    Meshtastic,
}

impl PacketSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketSource::Lorawan => "lorawan",
            PacketSource::Meshtastic => "meshtastic",
        }
    }
}

/// A single geolocated packet reception.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub id: String,
    pub device_id: String,
    pub session_id: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub rssi: Option<f64>,
    pub snr: Option<f64>,
    pub spreading_factor: Option<u8>,
    pub gateway_id: Option<String>,
    pub receiver_id: Option<String>,
    pub source: PacketSource,
}

/// Sampled point of a session track, as returned by the track endpoint.
/// Timestamps are epoch milliseconds so playback math stays integral.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    pub timestamp_ms: i64,
    pub lat: f64,
    pub lon: f64,
    pub rssi: Option<f64>,
    pub snr: Option<f64>,
}
