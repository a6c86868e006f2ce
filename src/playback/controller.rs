//! Ticker-driven playback over one session's track.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::ClientConfig;
use crate::query::FilterSet;

use super::state::{self, PlaybackState, SessionBounds};

const TICK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize, Clone)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub bounds: Option<SessionBounds>,
    /// The currently materialized `[start, end)` window, if non-empty.
    pub window: Option<(i64, i64)>,
}

struct Inner {
    state: PlaybackState,
    bounds: Option<SessionBounds>,
}

/// Owns a [`PlaybackState`] plus the session bounds and drives auto-advance
/// with a background ticker. Cloneable; clones share the same playback.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Mutex<Inner>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    target_points: u32,
}

impl PlaybackController {
    /// Window width and point budget come from the client configuration.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: PlaybackState::new(config.default_window_ms),
                bounds: None,
            })),
            ticker: Arc::new(Mutex::new(None)),
            target_points: config.target_points_per_window,
        }
    }

    pub async fn snapshot(&self) -> PlaybackSnapshot {
        let inner = self.inner.lock().await;
        PlaybackSnapshot {
            window: inner
                .bounds
                .as_ref()
                .and_then(|bounds| state::active_window(&inner.state, bounds)),
            state: inner.state.clone(),
            bounds: inner.bounds,
        }
    }

    /// Installs (or clears) session bounds, reconciling the cursor and
    /// stopping playback when bounds go away.
    pub async fn set_bounds(&self, bounds: Option<SessionBounds>) {
        let was_playing;
        {
            let mut inner = self.inner.lock().await;
            was_playing = inner.state.is_playing;
            inner.bounds = bounds;
            inner.state.apply_bounds(bounds.as_ref());
        }
        if was_playing && bounds.is_none() {
            self.cancel_ticker().await;
        }
    }

    /// Toggles play/pause. Returns the new playing flag; `false` with no
    /// state change when bounds are unknown.
    pub async fn toggle(&self) -> bool {
        let playing = {
            let mut inner = self.inner.lock().await;
            let bounds = inner.bounds;
            if !inner.state.toggle_playing(bounds.as_ref()) {
                debug!("play toggle rejected: session bounds unknown");
                return false;
            }
            inner.state.is_playing
        };

        if playing {
            self.spawn_ticker().await;
        } else {
            self.cancel_ticker().await;
        }
        playing
    }

    pub async fn scrub_to(&self, at_ms: i64) {
        let mut inner = self.inner.lock().await;
        let bounds = inner.bounds;
        inner.state.set_cursor(at_ms, bounds.as_ref());
    }

    /// Scrub from a pointer position over the rendered span.
    pub async fn scrub_at_pixel(&self, x: f64, padding: f64, width: f64) {
        let mut inner = self.inner.lock().await;
        let Some(bounds) = inner.bounds else {
            return;
        };
        let Some(window) = state::active_window(&inner.state, &bounds) else {
            return;
        };
        let at = state::timestamp_at_pixel(x, padding, width, window, &bounds);
        inner.state.set_cursor(at, Some(&bounds));
    }

    /// Filter for the track request covering the currently active window:
    /// explicit `from`/`to` range plus a sample factor bounding the point
    /// count. `None` while the window is empty or bounds are unknown.
    pub async fn track_filter(&self, session_id: &str) -> Option<FilterSet> {
        let inner = self.inner.lock().await;
        let bounds = inner.bounds.as_ref()?;
        let window = state::active_window(&inner.state, bounds)?;
        state::window_track_filter(session_id, window, self.target_points)
    }

    /// Takes effect on the next tick; the cursor is not reset.
    pub async fn set_speed(&self, speed: super::Speed) {
        self.inner.lock().await.state.speed = speed;
    }

    /// Takes effect immediately; the cursor is not reset.
    pub async fn set_window(&self, window_ms: i64) {
        self.inner.lock().await.state.window_ms = window_ms;
    }

    async fn spawn_ticker(&self) {
        let mut guard = self.ticker.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(TICK_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_tick = Instant::now();

            loop {
                ticker.tick().await;
                let now = Instant::now();
                let elapsed = now - last_tick;
                last_tick = now;

                let mut guard = inner.lock().await;
                if !guard.state.is_playing {
                    break;
                }
                let Some(bounds) = guard.bounds else {
                    guard.state.is_playing = false;
                    break;
                };
                guard.state.advance(elapsed, &bounds);
                if !guard.state.is_playing {
                    // Pinned at the end of the session.
                    break;
                }
            }
        });

        *guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(min_ms: i64, max_ms: i64) -> SessionBounds {
        SessionBounds { min_ms, max_ms }
    }

    fn controller(window_ms: i64) -> PlaybackController {
        PlaybackController::new(&ClientConfig {
            default_window_ms: window_ms,
            ..ClientConfig::default()
        })
    }

    #[tokio::test]
    async fn toggle_is_rejected_without_bounds() {
        let controller = controller(2000);
        assert!(!controller.toggle().await);
        assert!(!controller.snapshot().await.state.is_playing);
    }

    #[tokio::test]
    async fn scrub_clamps_against_bounds() {
        let controller = controller(2000);
        controller.set_bounds(Some(bounds(1000, 5000))).await;

        controller.scrub_to(9000).await;
        assert_eq!(controller.snapshot().await.state.cursor_ms, 5000);

        controller.scrub_to(-10).await;
        assert_eq!(controller.snapshot().await.state.cursor_ms, 1000);
    }

    #[tokio::test]
    async fn snapshot_exposes_the_active_window() {
        let controller = controller(2000);
        controller.set_bounds(Some(bounds(0, 4000))).await;
        controller.scrub_to(1000).await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.window, Some((1000, 3000)));
    }

    #[tokio::test]
    async fn track_filter_covers_the_active_window() {
        let controller = PlaybackController::new(&ClientConfig {
            default_window_ms: 800_000,
            target_points_per_window: 400,
            ..ClientConfig::default()
        });

        // No bounds yet: no request to make.
        assert!(controller.track_filter("ses-1").await.is_none());

        controller.set_bounds(Some(bounds(0, 2_000_000))).await;
        let filter = controller.track_filter("ses-1").await.unwrap();
        assert_eq!(filter.session_id.as_deref(), Some("ses-1"));
        // 800 s window at 400 target points: every other point.
        assert_eq!(filter.sample_factor, Some(2));
        let params = filter.to_query_params();
        assert!(params.contains(&("from".to_string(), "1970-01-01T00:00:00.000Z".to_string())));
        assert!(params.contains(&("to".to_string(), "1970-01-01T00:13:20.000Z".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn playback_advances_and_pins_at_end() {
        let controller = controller(2000);
        controller.set_bounds(Some(bounds(0, 1000))).await;

        assert!(controller.toggle().await);
        // Paused tokio time auto-advances; give the ticker room to run out
        // the 1-second session.
        tokio::time::sleep(Duration::from_secs(3)).await;

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.state.cursor_ms, 1000);
        assert!(!snapshot.state.is_playing);
    }

    #[tokio::test]
    async fn losing_bounds_stops_playback() {
        let controller = controller(2000);
        controller.set_bounds(Some(bounds(0, 60_000))).await;
        assert!(controller.toggle().await);

        controller.set_bounds(None).await;
        let snapshot = controller.snapshot().await;
        assert!(!snapshot.state.is_playing);
        assert!(snapshot.bounds.is_none());
    }
}
