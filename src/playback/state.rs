use std::time::Duration;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::models::SessionSummary;
use crate::query::FilterSet;

/// Playback rate multiplier. The set is fixed; arbitrary rates are not
/// part of the UI contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Speed {
    Quarter,
    Half,
    Normal,
    Double,
    Quadruple,
}

impl Default for Speed {
    fn default() -> Self {
        Speed::Normal
    }
}

impl Speed {
    pub fn multiplier(&self) -> f64 {
        match self {
            Speed::Quarter => 0.25,
            Speed::Half => 0.5,
            Speed::Normal => 1.0,
            Speed::Double => 2.0,
            Speed::Quadruple => 4.0,
        }
    }
}

/// Point-time bounds of a session, epoch milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionBounds {
    pub min_ms: i64,
    pub max_ms: i64,
}

impl SessionBounds {
    /// Bounds from a timeline summary; `None` when the session has no
    /// points (playback is impossible then).
    pub fn from_summary(summary: &SessionSummary) -> Option<Self> {
        match (summary.first_point_ms, summary.last_point_ms) {
            (Some(min_ms), Some(max_ms)) if summary.point_count > 0 && min_ms <= max_ms => {
                Some(Self { min_ms, max_ms })
            }
            _ => None,
        }
    }

    pub fn clamp(&self, at_ms: i64) -> i64 {
        at_ms.clamp(self.min_ms, self.max_ms)
    }
}

/// Scrub cursor, window width, and play state for one session's series.
///
/// Owned by the consuming view for its lifetime; all the window math here
/// is pure functions of this state plus the session bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub cursor_ms: i64,
    pub window_ms: i64,
    pub is_playing: bool,
    pub speed: Speed,
}

impl PlaybackState {
    pub fn new(window_ms: i64) -> Self {
        Self {
            cursor_ms: 0,
            window_ms,
            is_playing: false,
            speed: Speed::default(),
        }
    }

    /// Reconciles the cursor with newly-arrived (or changed) bounds. A
    /// cursor that was provisional or now falls outside the session snaps
    /// to the start; losing bounds while playing forces a pause.
    pub fn apply_bounds(&mut self, bounds: Option<&SessionBounds>) {
        match bounds {
            Some(bounds) => {
                if self.cursor_ms < bounds.min_ms || self.cursor_ms > bounds.max_ms {
                    self.cursor_ms = bounds.min_ms;
                }
            }
            None => {
                self.is_playing = false;
            }
        }
    }

    /// Moves the cursor, clamped to bounds when they are known. Without
    /// bounds the position is provisional and re-clamped on arrival.
    pub fn set_cursor(&mut self, at_ms: i64, bounds: Option<&SessionBounds>) {
        self.cursor_ms = match bounds {
            Some(bounds) => bounds.clamp(at_ms),
            None => at_ms,
        };
    }

    /// Toggles play/pause. Rejected (no-op, returns false) while no bounds
    /// are known.
    pub fn toggle_playing(&mut self, bounds: Option<&SessionBounds>) -> bool {
        if bounds.is_none() {
            return false;
        }
        self.is_playing = !self.is_playing;
        true
    }

    /// Advances the cursor by `speed × elapsed` wall-clock time. Running
    /// past the end pins the cursor at `max_ms` and stops playback; there
    /// is no wraparound.
    pub fn advance(&mut self, elapsed: Duration, bounds: &SessionBounds) {
        if !self.is_playing {
            return;
        }
        let delta_ms = (elapsed.as_millis() as f64 * self.speed.multiplier()).round() as i64;
        let next = self.cursor_ms.saturating_add(delta_ms);
        if next >= bounds.max_ms {
            self.cursor_ms = bounds.max_ms;
            self.is_playing = false;
        } else {
            self.cursor_ms = next.max(bounds.min_ms);
        }
    }
}

/// The half-open interval `[cursor, cursor + window)` intersected with the
/// session bounds. `None` when the intersection is empty.
pub fn active_window(state: &PlaybackState, bounds: &SessionBounds) -> Option<(i64, i64)> {
    let start = state.cursor_ms.max(bounds.min_ms);
    let end = state
        .cursor_ms
        .saturating_add(state.window_ms)
        .min(bounds.max_ms);
    (start < end).then_some((start, end))
}

/// Sampling factor for a window so the returned point count stays bounded
/// regardless of the window's absolute span. Base series resolution is one
/// point per second.
pub fn sample_factor_for(window_ms: i64, target_points: u32) -> u32 {
    if window_ms <= 0 || target_points == 0 {
        return 1;
    }
    let window_secs = (window_ms as f64 / 1000.0).ceil();
    let factor = (window_secs / f64::from(target_points)).ceil() as u32;
    factor.max(1)
}

/// Track request filter for one playback window: the window as an explicit
/// time range plus a sample factor that keeps the returned point count
/// bounded by `target_points`. `None` for timestamps no calendar date can
/// represent.
pub fn window_track_filter(
    session_id: &str,
    window: (i64, i64),
    target_points: u32,
) -> Option<FilterSet> {
    let (start, end) = window;
    let from = DateTime::from_timestamp_millis(start)?;
    let to = DateTime::from_timestamp_millis(end)?;
    Some(
        FilterSet::new()
            .session(session_id)
            .from_time(from)
            .to_time(to)
            .sample_factor(sample_factor_for(end - start, target_points)),
    )
}

/// Maps a pointer x-position inside the rendered span
/// `[padding, padding + width]` (representing `[window_start, window_end]`)
/// back to a timestamp, clamped to the session bounds.
pub fn timestamp_at_pixel(
    x: f64,
    padding: f64,
    width: f64,
    window: (i64, i64),
    bounds: &SessionBounds,
) -> i64 {
    let (start, end) = window;
    if width <= 0.0 || end <= start {
        return bounds.clamp(start);
    }
    let fraction = ((x - padding) / width).clamp(0.0, 1.0);
    let at = start as f64 + fraction * (end - start) as f64;
    bounds.clamp(at.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(min_ms: i64, max_ms: i64) -> SessionBounds {
        SessionBounds { min_ms, max_ms }
    }

    #[test]
    fn cursor_clamps_to_bounds() {
        let b = bounds(1000, 5000);
        let mut state = PlaybackState::new(2000);

        state.set_cursor(9000, Some(&b));
        assert_eq!(state.cursor_ms, 5000);

        state.set_cursor(-10, Some(&b));
        assert_eq!(state.cursor_ms, 1000);
    }

    #[test]
    fn provisional_cursor_snaps_when_bounds_arrive() {
        let mut state = PlaybackState::new(2000);
        state.set_cursor(9000, None);
        assert_eq!(state.cursor_ms, 9000);

        state.apply_bounds(Some(&bounds(1000, 5000)));
        assert_eq!(state.cursor_ms, 1000);
    }

    #[test]
    fn losing_bounds_forces_pause() {
        let b = bounds(0, 10_000);
        let mut state = PlaybackState::new(2000);
        assert!(state.toggle_playing(Some(&b)));
        assert!(state.is_playing);

        state.apply_bounds(None);
        assert!(!state.is_playing);
    }

    #[test]
    fn toggle_without_bounds_is_rejected() {
        let mut state = PlaybackState::new(2000);
        assert!(!state.toggle_playing(None));
        assert!(!state.is_playing);
    }

    #[test]
    fn window_intersects_session_bounds() {
        let mut state = PlaybackState::new(2000);
        state.cursor_ms = 1000;
        assert_eq!(active_window(&state, &bounds(0, 4000)), Some((1000, 3000)));

        // Window overhangs the end.
        state.cursor_ms = 3500;
        assert_eq!(active_window(&state, &bounds(0, 4000)), Some((3500, 4000)));

        // Cursor at the end: empty window.
        state.cursor_ms = 4000;
        assert_eq!(active_window(&state, &bounds(0, 4000)), None);
    }

    #[test]
    fn advance_pins_at_end_and_stops() {
        let b = bounds(0, 10_000);
        let mut state = PlaybackState::new(2000);
        state.toggle_playing(Some(&b));
        state.cursor_ms = 9000;

        state.advance(Duration::from_secs(2), &b);
        assert_eq!(state.cursor_ms, 10_000);
        assert!(!state.is_playing);

        // Advancing while stopped is inert.
        state.advance(Duration::from_secs(1), &b);
        assert_eq!(state.cursor_ms, 10_000);
    }

    #[test]
    fn advance_scales_with_speed() {
        let b = bounds(0, 1_000_000);
        let mut state = PlaybackState::new(2000);
        state.toggle_playing(Some(&b));
        state.speed = Speed::Quadruple;

        state.advance(Duration::from_secs(1), &b);
        assert_eq!(state.cursor_ms, 4000);

        state.speed = Speed::Quarter;
        state.advance(Duration::from_secs(1), &b);
        assert_eq!(state.cursor_ms, 4250);
    }

    #[test]
    fn sample_factor_scales_with_window_width() {
        // 400 s window at 400 target points: native resolution.
        assert_eq!(sample_factor_for(400_000, 400), 1);
        // 800 s window: every other point.
        assert_eq!(sample_factor_for(800_000, 400), 2);
        assert_eq!(sample_factor_for(0, 400), 1);
    }

    #[test]
    fn window_filter_carries_range_and_sample_factor() {
        // 800 s window at 400 target points: every other point.
        let filter = window_track_filter("ses-1", (0, 800_000), 400).unwrap();
        let params = filter.to_query_params();
        assert!(params.contains(&("sessionId".to_string(), "ses-1".to_string())));
        assert!(params.contains(&("from".to_string(), "1970-01-01T00:00:00.000Z".to_string())));
        assert!(params.contains(&("to".to_string(), "1970-01-01T00:13:20.000Z".to_string())));
        assert!(params.contains(&("sampleFactor".to_string(), "2".to_string())));
    }

    #[test]
    fn pixel_mapping_is_proportional_and_clamped() {
        let b = bounds(0, 10_000);
        let window = (2000, 4000);

        // Midpoint of the span.
        assert_eq!(timestamp_at_pixel(60.0, 10.0, 100.0, window, &b), 3000);
        // Left of the span clamps to window start.
        assert_eq!(timestamp_at_pixel(0.0, 10.0, 100.0, window, &b), 2000);
        // Right of the span clamps to window end.
        assert_eq!(timestamp_at_pixel(500.0, 10.0, 100.0, window, &b), 4000);
    }

    #[test]
    fn bounds_from_summary_require_points() {
        use chrono::{TimeZone, Utc};
        let started = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let summary = SessionSummary {
            id: "ses-1".into(),
            device_id: "dev-1".into(),
            started_at: started,
            ended_at: None,
            point_count: 0,
            first_point_ms: None,
            last_point_ms: None,
        };
        assert!(SessionBounds::from_summary(&summary).is_none());

        let summary = SessionSummary {
            point_count: 12,
            first_point_ms: Some(1000),
            last_point_ms: Some(8000),
            ..summary
        };
        assert_eq!(
            SessionBounds::from_summary(&summary),
            Some(SessionBounds {
                min_ms: 1000,
                max_ms: 8000
            })
        );
    }
}
