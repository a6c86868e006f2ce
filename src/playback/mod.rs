pub mod controller;
pub mod series;
pub mod state;

pub use controller::{PlaybackController, PlaybackSnapshot};
pub use series::{derive_series, DerivedSeries, SignalChannel};
pub use state::{
    active_window, sample_factor_for, timestamp_at_pixel, window_track_filter, PlaybackState,
    SessionBounds, Speed,
};
