//! Decides when a query may run and how often it silently re-runs.
//!
//! The default rule exists to stop half-filled UI state from firing
//! full-table requests; the polling rule exists to bound backend load to
//! queries that are actually "live".

use std::time::Duration;

use crate::config::ClientConfig;

use super::filter::FilterSet;
use super::key::QueryKind;

/// Whether a query is currently allowed to run.
///
/// A caller-provided override can only narrow: `Some(false)` forces a query
/// off, `Some(true)` re-asserts the default scoping rule but never widens
/// past it. A malformed filter (inverted time range, bad bounding box)
/// always disables, override or not.
pub fn should_enable(kind: QueryKind, filter: &FilterSet, enabled: Option<bool>) -> bool {
    if filter.validate().is_err() {
        return false;
    }
    match enabled {
        Some(flag) => flag && default_rule(kind, filter),
        None => default_rule(kind, filter),
    }
}

fn default_rule(kind: QueryKind, filter: &FilterSet) -> bool {
    match kind {
        // Coverage queries also need an area to bin over.
        QueryKind::CoverageBins => filter.bounding_box.is_some() && filter.has_scope(),
        _ => filter.has_scope(),
    }
}

/// Polling interval for a query, or `None` when it must not auto-poll.
///
/// Only live-tail queries (no upper time bound) and narrow explicit ranges
/// are eligible; wide historical ranges never re-run on their own.
pub fn refresh_interval(
    kind: QueryKind,
    filter: &FilterSet,
    config: &ClientConfig,
) -> Option<Duration> {
    if !kind.poll_eligible() {
        return None;
    }
    match filter.time_range_width() {
        // No upper bound: following the present.
        None if filter.to_time.is_none() => Some(config.poll_interval),
        // Upper bound without lower bound is a wide historical query.
        None => None,
        Some(width) => {
            let narrow = width.to_std().map_or(false, |w| w <= config.narrow_range_cutoff);
            narrow.then_some(config.poll_interval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn unscoped_filter_is_disabled() {
        assert!(!should_enable(
            QueryKind::Measurements,
            &FilterSet::new(),
            None
        ));
    }

    #[test]
    fn either_scope_id_enables() {
        assert!(should_enable(
            QueryKind::Measurements,
            &FilterSet::new().device("dev-1"),
            None
        ));
        assert!(should_enable(
            QueryKind::Measurements,
            &FilterSet::new().session("ses-1"),
            None
        ));
    }

    #[test]
    fn explicit_false_always_wins() {
        let filter = FilterSet::new().device("dev-1");
        assert!(!should_enable(QueryKind::Measurements, &filter, Some(false)));
    }

    #[test]
    fn override_cannot_enable_a_malformed_filter() {
        let filter = FilterSet::new()
            .device("dev-1")
            .from_time(at(10))
            .to_time(at(8));
        assert!(!should_enable(QueryKind::Measurements, &filter, Some(true)));
    }

    #[test]
    fn override_cannot_widen_past_the_scope_rule() {
        assert!(!should_enable(
            QueryKind::Measurements,
            &FilterSet::new(),
            Some(true)
        ));

        let unboxed = FilterSet::new().device("dev-1");
        assert!(!should_enable(QueryKind::CoverageBins, &unboxed, Some(true)));
    }

    #[test]
    fn coverage_needs_a_bounding_box() {
        let scoped = FilterSet::new().device("dev-1");
        assert!(!should_enable(QueryKind::CoverageBins, &scoped, None));
    }

    #[test]
    fn live_tail_polls() {
        let config = ClientConfig::default();
        let filter = FilterSet::new().device("dev-1");
        assert_eq!(
            refresh_interval(QueryKind::Measurements, &filter, &config),
            Some(config.poll_interval)
        );
    }

    #[test]
    fn narrow_range_polls_wide_range_does_not() {
        let config = ClientConfig::default();
        let narrow = FilterSet::new()
            .device("dev-1")
            .from_time(at(10))
            .to_time(at(10) + chrono::Duration::minutes(30));
        assert!(refresh_interval(QueryKind::Measurements, &narrow, &config).is_some());

        let wide = FilterSet::new()
            .device("dev-1")
            .from_time(at(0))
            .to_time(at(12));
        assert_eq!(refresh_interval(QueryKind::Measurements, &wide, &config), None);
    }

    #[test]
    fn event_stream_never_polls() {
        let config = ClientConfig::default();
        let filter = FilterSet::new().device("dev-1");
        assert_eq!(refresh_interval(QueryKind::Events, &filter, &config), None);
    }
}
