//! Derives a drawable signal series from windowed track points.
//!
//! Pure and restartable: identical `(window, points)` inputs always produce
//! the identical derived series.

use serde::{Deserialize, Serialize};

use crate::models::TrackPoint;

/// Which signal metric the chart draws.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SignalChannel {
    Rssi,
    Snr,
}

/// Windowed samples of one channel plus the value range to scale against.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSeries {
    pub channel: SignalChannel,
    pub samples: Vec<(i64, f64)>,
    pub min_value: f64,
    pub max_value: f64,
}

/// Margin applied to a degenerate (single-value) range so a flat line is
/// still drawable.
const FLAT_RANGE_MARGIN: f64 = 1.0;

/// Selects the signal channel for the window — RSSI preferred, SNR as the
/// fallback when RSSI is absent across the whole window — and computes the
/// normalized value range. Returns `None` when no point in the window
/// carries either metric.
pub fn derive_series(points: &[TrackPoint], window: (i64, i64)) -> Option<DerivedSeries> {
    let (start, end) = window;
    let windowed: Vec<&TrackPoint> = points
        .iter()
        .filter(|point| point.timestamp_ms >= start && point.timestamp_ms < end)
        .collect();

    let channel = if windowed.iter().any(|point| point.rssi.is_some()) {
        SignalChannel::Rssi
    } else if windowed.iter().any(|point| point.snr.is_some()) {
        SignalChannel::Snr
    } else {
        return None;
    };

    let samples: Vec<(i64, f64)> = windowed
        .iter()
        .filter_map(|point| {
            let value = match channel {
                SignalChannel::Rssi => point.rssi,
                SignalChannel::Snr => point.snr,
            };
            value.map(|v| (point.timestamp_ms, v))
        })
        .collect();

    let mut min_value = f64::INFINITY;
    let mut max_value = f64::NEG_INFINITY;
    for (_, value) in &samples {
        min_value = min_value.min(*value);
        max_value = max_value.max(*value);
    }

    if min_value == max_value {
        min_value -= FLAT_RANGE_MARGIN;
        max_value += FLAT_RANGE_MARGIN;
    }

    Some(DerivedSeries {
        channel,
        samples,
        min_value,
        max_value,
    })
}
