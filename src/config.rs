use std::time::Duration;

/// Tuning knobs for the query layer with sensible dashboard defaults.
///
/// These are load-bounding constants, not behavioral contracts: a deployment
/// pointed at a busier backend can widen the poll interval or shrink the
/// page size without touching query logic.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How often a live (narrow or unbounded time range) query re-runs.
    pub poll_interval: Duration,

    /// Time ranges at or below this width count as "narrow" and are
    /// eligible for interval polling. Wider ranges never auto-poll.
    pub narrow_range_cutoff: Duration,

    /// Attempts per request for retryable failures (network, 5xx).
    pub max_retries: u32,

    /// Page size requested from cursor-paginated endpoints.
    pub page_size: u32,

    /// Upper bound on points requested per playback window; the sample
    /// factor scales with window width to stay under this.
    pub target_points_per_window: u32,

    /// Initial playback window width.
    pub default_window_ms: i64,

    /// Whether this client was configured with elevated (admin) access.
    /// Decided once at startup from the transport configuration.
    pub elevated: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            narrow_range_cutoff: Duration::from_secs(60 * 60),
            max_retries: 3,
            page_size: 50,
            target_points_per_window: 400,
            default_window_ms: 5 * 60 * 1000,
            elevated: false,
        }
    }
}
