//! Typed query surface over the cache and transport.
//!
//! `QueryClient` is cheap to clone (everything shared sits behind an Arc)
//! and is handed to every view that reads from the backend. It owns the
//! gate checks, the per-kind endpoint mapping, the unsupported-capability
//! latch, and mutation-driven cache invalidation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use log::{debug, info, warn};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{ApiResult, QueryError};
use crate::models::{ListEnvelope, Measurement, SessionSummary, TrackPoint};
use crate::transport::{self, ApiRequest, Method, Transport};

use super::cache::{QueryCache, QueryState};
use super::filter::FilterSet;
use super::gating;
use super::key::{QueryKey, QueryKind};

fn path_for(kind: QueryKind) -> &'static str {
    match kind {
        QueryKind::Measurements => "api/measurements",
        QueryKind::Track => "api/track",
        QueryKind::CoverageBins => "api/coverage/bins",
        QueryKind::Events => "api/events",
        QueryKind::Sessions => "api/sessions",
        QueryKind::TimelineSummary => "api/timeline/summary",
    }
}

#[derive(Clone)]
pub struct QueryClient {
    transport: Arc<dyn Transport>,
    cache: QueryCache,
    config: Arc<ClientConfig>,
    /// Whether the owning view is currently visible. Polling is suspended
    /// entirely while it is not.
    visible: Arc<AtomicBool>,
    /// Kinds the backend answered 404 for; latched off for the session.
    unsupported: Arc<StdMutex<HashSet<QueryKind>>>,
}

impl QueryClient {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            transport,
            cache: QueryCache::new(),
            config: Arc::new(config),
            visible: Arc::new(AtomicBool::new(true)),
            unsupported: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Relaxed);
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    /// Whether this client was configured with elevated access. Views
    /// consult this before offering mutating actions at all.
    pub fn is_elevated(&self) -> bool {
        self.config.elevated
    }

    pub fn is_unsupported(&self, kind: QueryKind) -> bool {
        self.unsupported.lock().unwrap().contains(&kind)
    }

    fn mark_unsupported(&self, kind: QueryKind) {
        let mut set = self.unsupported.lock().unwrap();
        if set.insert(kind) {
            info!(
                "backend reports {} unavailable; disabling for this session",
                kind.as_str()
            );
        }
    }

    /// Core read path: validate, gate, normalize the key, then fetch
    /// through the cache with a retrying loader. Returns the (possibly
    /// stale-while-revalidating) state for the key.
    pub async fn run_query(
        &self,
        kind: QueryKind,
        filter: &FilterSet,
        enabled: Option<bool>,
    ) -> Result<QueryState<Value>, QueryError> {
        filter.validate()?;
        let key = QueryKey::canonical(kind, filter);

        if self.is_unsupported(kind) {
            debug!("{} latched unsupported; serving cached state", kind.as_str());
            return Ok(self.cache.state(&key).await);
        }
        if !gating::should_enable(kind, filter, enabled) {
            debug!("{} gated off for {}", kind.as_str(), key.canonical_str());
            return Ok(self.cache.state(&key).await);
        }

        let request =
            ApiRequest::get(path_for(kind)).with_query(filter.to_query_params());
        let transport = self.transport.clone();
        let max_retries = self.config.max_retries;

        let state = self
            .cache
            .fetch(&key, move |token| async move {
                let body =
                    transport::send_with_retry(transport.as_ref(), &request, &token, max_retries)
                        .await?;
                body.ok_or_else(|| {
                    crate::error::ApiError::Decode("expected a response body".into())
                })
            })
            .await;

        if let Some(err) = &state.error {
            if err.is_unsupported() && kind.is_optional_capability() {
                self.mark_unsupported(kind);
            }
        }

        Ok(state)
    }

    pub async fn measurements(
        &self,
        filter: &FilterSet,
        enabled: Option<bool>,
    ) -> Result<QueryState<ListEnvelope<Measurement>>, QueryError> {
        let state = self.run_query(QueryKind::Measurements, filter, enabled).await?;
        decode_list_state(state)
    }

    pub async fn track(
        &self,
        filter: &FilterSet,
        enabled: Option<bool>,
    ) -> Result<QueryState<ListEnvelope<TrackPoint>>, QueryError> {
        let state = self.run_query(QueryKind::Track, filter, enabled).await?;
        decode_list_state(state)
    }

    pub async fn coverage_bins(
        &self,
        filter: &FilterSet,
        enabled: Option<bool>,
    ) -> Result<QueryState<Value>, QueryError> {
        self.run_query(QueryKind::CoverageBins, filter, enabled).await
    }

    pub async fn sessions(
        &self,
        filter: &FilterSet,
        enabled: Option<bool>,
    ) -> Result<QueryState<ListEnvelope<SessionSummary>>, QueryError> {
        let state = self.run_query(QueryKind::Sessions, filter, enabled).await?;
        decode_list_state(state)
    }

    /// Point-time bounds for a session, the playback engine's clamp source.
    pub async fn timeline_summary(
        &self,
        session_id: &str,
    ) -> Result<QueryState<SessionSummary>, QueryError> {
        let filter = FilterSet::new().session(session_id);
        let state = self
            .run_query(QueryKind::TimelineSummary, &filter, None)
            .await?;
        Ok(state.decode()?)
    }

    /// Performs a mutating request and, on success, invalidates every
    /// cached key whose scope could include the mutated entity. The next
    /// read of those keys reflects the change; this is required behavior,
    /// not an optimization.
    ///
    /// Mutations require elevated access; a client configured without it
    /// is refused locally, before any request is issued.
    pub async fn submit_mutation(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        device_id: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<Option<Value>, QueryError> {
        if !self.is_elevated() {
            return Err(QueryError::Api(crate::error::ApiError::Status {
                status: 403,
                message: "elevated access required".into(),
                payload: None,
                request_id: None,
            }));
        }

        let mut request = ApiRequest::new(method, path);
        if let Some(body) = body {
            request = request.with_body(body);
        }

        let token = CancellationToken::new();
        let result =
            transport::send_with_retry(self.transport.as_ref(), &request, &token, 1).await?;

        self.cache
            .invalidate_matching(|key| key.covers_scope(device_id, session_id))
            .await;

        Ok(result)
    }

    /// Raw page fetch for the pagination engine. Deliberately bypasses the
    /// cache: cursors are only meaningful relative to the filter that
    /// produced them, and pages are owned by a single pager instance.
    pub(crate) async fn fetch_page_body(
        &self,
        filter: &FilterSet,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> ApiResult<Option<Value>> {
        let mut params = filter.to_query_params();
        if filter.limit.is_none() {
            params.push(("limit".into(), self.config.page_size.to_string()));
        }
        if let Some(cursor) = cursor {
            params.push(("cursor".into(), cursor.to_string()));
        }
        let request = ApiRequest::get(path_for(QueryKind::Events)).with_query(params);
        transport::send_with_retry(
            self.transport.as_ref(),
            &request,
            cancel,
            self.config.max_retries,
        )
        .await
    }
}

fn decode_list_state<T: serde::de::DeserializeOwned>(
    state: QueryState<Value>,
) -> Result<QueryState<ListEnvelope<T>>, QueryError> {
    let data = match state.data {
        Some(value) => Some(transport::decode_list(Some(value))?),
        None => None,
    };
    Ok(QueryState {
        status: state.status,
        data,
        error: state.error,
        last_fetched_at: state.last_fetched_at,
    })
}

/// Background refresh worker for one live query.
///
/// Runs the query on its refresh interval while the owning view is visible,
/// and stops itself if the kind gets latched unsupported. Started and torn
/// down alongside the view that owns the filter.
pub struct Poller {
    handle: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

impl Poller {
    /// Spawns the refresh loop, or returns an inert poller when the query
    /// is not eligible for polling (wide range, event stream).
    pub fn start(client: QueryClient, kind: QueryKind, filter: FilterSet) -> Self {
        let Some(interval) = gating::refresh_interval(kind, &filter, client.config()) else {
            return Self {
                handle: None,
                cancel: None,
            };
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it, the owning view
            // already issued the initial fetch.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !client.is_visible() {
                            continue;
                        }
                        if client.is_unsupported(kind) {
                            debug!("{} unsupported; poller exiting", kind.as_str());
                            break;
                        }
                        if let Err(err) = client.run_query(kind, &filter, None).await {
                            warn!("poll of {} failed: {err}", kind.as_str());
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });

        Self {
            handle: Some(handle),
            cancel: Some(cancel),
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
