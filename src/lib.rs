//! Client-side data layer for the meshview telemetry dashboard.
//!
//! The view layer hands filter state to this crate and gets back typed
//! query results plus imperative controls. Four pieces do the actual work:
//!
//! - query key normalization ([`query::key`]) turns heterogeneous optional
//!   filters into stable cache identities,
//! - fetch gating and refresh control ([`query::gating`]) decides when a
//!   query may run and how often it silently re-runs,
//! - the cursor pagination engine ([`query::pager`]) walks unbounded event
//!   streams page by page,
//! - the playback window engine ([`playback`]) drives a scrubbable time
//!   window over a session's sparse point series.
//!
//! Everything network-shaped goes through the [`transport::Transport`]
//! trait; [`transport::HttpTransport`] is the reqwest-backed production
//! implementation.

pub mod config;
pub mod error;
pub mod models;
pub mod playback;
pub mod query;
pub mod transport;

pub use config::ClientConfig;
pub use error::{ApiError, FilterError, QueryError};
pub use models::{
    EventRecord, ListEnvelope, Measurement, Page, PacketSource, SessionSummary, TrackPoint,
};
pub use playback::{PlaybackController, PlaybackState, SessionBounds, Speed};
pub use query::{
    EventPager, FilterSet, Poller, QueryCache, QueryClient, QueryKey, QueryKind, QueryState,
    QueryStatus,
};
pub use transport::{HttpTransport, Transport};
