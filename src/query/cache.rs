//! Shared `QueryKey -> QueryState` store.
//!
//! One instance is created at application start and threaded into every
//! component that reads from the backend; it is the only mutable resource
//! shared across consumers. It deduplicates concurrent fetches for the same
//! key, serves stale data while a refresh is in flight, suppresses late
//! results from superseded requests, and is cleared wholesale on logout.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};

use super::key::QueryKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Lifecycle snapshot of one logical query.
///
/// `data` survives refetches until a new result lands
/// (stale-while-revalidate), so `data.is_some()` does not imply
/// `status == Success`. Absence-of-data and error-while-fetching are always
/// distinguishable: a failure sets `error`, never an empty success.
#[derive(Debug, Clone)]
pub struct QueryState<T = Value> {
    pub status: QueryStatus,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            last_fetched_at: None,
        }
    }
}

impl QueryState<Value> {
    /// Re-types the cached payload. Decoding happens at the read edge; the
    /// cache itself stores raw JSON so heterogeneous keys share one map.
    pub fn decode<T: serde::de::DeserializeOwned>(self) -> ApiResult<QueryState<T>> {
        let data = match self.data {
            Some(value) => Some(
                serde_json::from_value(value).map_err(|err| ApiError::Decode(err.to_string()))?,
            ),
            None => None,
        };
        Ok(QueryState {
            status: self.status,
            data,
            error: self.error,
            last_fetched_at: self.last_fetched_at,
        })
    }
}

struct Inflight {
    done: watch::Receiver<bool>,
    cancel: CancellationToken,
}

struct CacheEntry {
    state: QueryState<Value>,
    /// Bumped on every invalidation. A completion whose captured generation
    /// no longer matches belongs to a superseded request and is discarded.
    generation: u64,
    inflight: Option<Inflight>,
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            state: QueryState::default(),
            generation: 1,
            inflight: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct QueryCache {
    inner: Arc<Mutex<HashMap<QueryKey, CacheEntry>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for a key; idle default if never fetched.
    pub async fn state(&self, key: &QueryKey) -> QueryState<Value> {
        let map = self.inner.lock().await;
        map.get(key).map(|entry| entry.state.clone()).unwrap_or_default()
    }

    /// Runs `load` for `key`, or joins an already in-flight request for the
    /// same key. Exactly one network call is outstanding per key at a time.
    ///
    /// The loader receives a cancellation token; if the key is invalidated
    /// while the load is in flight, the token fires and the late result is
    /// discarded instead of applied.
    pub async fn fetch<F, Fut>(&self, key: &QueryKey, load: F) -> QueryState<Value>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ApiResult<Value>>,
    {
        let (token, generation, done_tx) = {
            let mut map = self.inner.lock().await;
            let entry = map.entry(key.clone()).or_default();

            if let Some(inflight) = &entry.inflight {
                let mut done = inflight.done.clone();
                drop(map);
                // Join the in-flight request; the sender fires (or drops)
                // exactly once when it settles.
                let _ = done.changed().await;
                return self.state(key).await;
            }

            entry.state.status = QueryStatus::Loading;
            entry.state.error = None;

            let token = CancellationToken::new();
            let (tx, rx) = watch::channel(false);
            entry.inflight = Some(Inflight {
                done: rx,
                cancel: token.clone(),
            });
            (token, entry.generation, tx)
        };

        let result = load(token.clone()).await;

        {
            let mut map = self.inner.lock().await;
            // `get_mut`, not `entry()`: if the key vanished (logout clear),
            // the result has nowhere to land and is dropped.
            if let Some(entry) = map.get_mut(key) {
                let superseded = entry.generation != generation || token.is_cancelled();
                if superseded {
                    debug!("dropping superseded response for {:?}", key.kind());
                } else {
                    entry.inflight = None;
                    match result {
                        Ok(value) => {
                            entry.state.status = QueryStatus::Success;
                            entry.state.data = Some(value);
                            entry.state.error = None;
                            entry.state.last_fetched_at = Some(Utc::now());
                        }
                        Err(err) if err.is_cancelled() => {
                            // Intentional abandonment is not an error state.
                            entry.state.status = if entry.state.data.is_some() {
                                QueryStatus::Success
                            } else {
                                QueryStatus::Idle
                            };
                        }
                        Err(err) => {
                            entry.state.status = QueryStatus::Error;
                            entry.state.error = Some(err);
                        }
                    }
                }
            }
        }

        // Wake joiners after the state is settled.
        let _ = done_tx.send(true);

        self.state(key).await
    }

    /// Cancels the in-flight request for a key (if any) and marks the key so
    /// a late result is discarded. Cached data is kept for
    /// stale-while-revalidate; the next fetch starts fresh.
    pub async fn invalidate(&self, key: &QueryKey) {
        self.invalidate_matching(|candidate| candidate == key).await;
    }

    /// Invalidates every key the predicate selects. Used after mutations:
    /// any key whose scope could include the mutated entity must not serve
    /// its cached result as current.
    pub async fn invalidate_matching(&self, pred: impl Fn(&QueryKey) -> bool) {
        let mut map = self.inner.lock().await;
        for (key, entry) in map.iter_mut() {
            if !pred(key) {
                continue;
            }
            entry.generation += 1;
            if let Some(inflight) = entry.inflight.take() {
                inflight.cancel.cancel();
            }
            if entry.state.status == QueryStatus::Loading {
                entry.state.status = if entry.state.data.is_some() {
                    QueryStatus::Success
                } else {
                    QueryStatus::Idle
                };
            }
        }
    }

    /// Drops everything. Logout/reconfiguration teardown; in-flight
    /// requests are cancelled and their results have nowhere to land.
    pub async fn clear(&self) {
        let mut map = self.inner.lock().await;
        for entry in map.values_mut() {
            if let Some(inflight) = entry.inflight.take() {
                inflight.cancel.cancel();
            }
        }
        map.clear();
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::FilterSet;
    use crate::query::key::QueryKind;
    use serde_json::json;

    fn key_for(device: &str) -> QueryKey {
        QueryKey::canonical(QueryKind::Measurements, &FilterSet::new().device(device))
    }

    #[tokio::test]
    async fn fetch_stores_success() {
        let cache = QueryCache::new();
        let key = key_for("dev-1");

        let state = cache.fetch(&key, |_| async { Ok(json!([1, 2])) }).await;
        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(json!([1, 2])));
        assert!(state.last_fetched_at.is_some());
    }

    #[tokio::test]
    async fn refetch_keeps_stale_data_while_loading() {
        let cache = QueryCache::new();
        let key = key_for("dev-1");

        cache.fetch(&key, |_| async { Ok(json!("first")) }).await;

        // Observe the loading state from inside the second loader.
        let observer = cache.clone();
        let observed_key = key.clone();
        let state = cache
            .fetch(&key, move |_| async move {
                let mid = observer.state(&observed_key).await;
                assert_eq!(mid.status, QueryStatus::Loading);
                assert_eq!(mid.data, Some(json!("first")));
                Ok(json!("second"))
            })
            .await;

        assert_eq!(state.status, QueryStatus::Success);
        assert_eq!(state.data, Some(json!("second")));
    }

    #[tokio::test]
    async fn error_is_recorded_and_distinguishable_from_empty() {
        let cache = QueryCache::new();
        let key = key_for("dev-1");

        let state = cache
            .fetch(&key, |_| async { Err(ApiError::Network("offline".into())) })
            .await;
        assert_eq!(state.status, QueryStatus::Error);
        assert!(state.error.is_some());
        assert!(state.data.is_none());
    }

    #[tokio::test]
    async fn cancellation_is_not_an_error() {
        let cache = QueryCache::new();
        let key = key_for("dev-1");

        let state = cache.fetch(&key, |_| async { Err(ApiError::Cancelled) }).await;
        assert_eq!(state.status, QueryStatus::Idle);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn invalidation_drops_late_result() {
        let cache = QueryCache::new();
        let key = key_for("dev-1");
        cache.fetch(&key, |_| async { Ok(json!("fresh")) }).await;

        // A load that is invalidated mid-flight must not clobber the entry.
        let invalidator = cache.clone();
        let invalidated_key = key.clone();
        let state = cache
            .fetch(&key, move |token| async move {
                invalidator.invalidate(&invalidated_key).await;
                assert!(token.is_cancelled());
                Ok(json!("late"))
            })
            .await;

        assert_eq!(state.data, Some(json!("fresh")));
    }

    #[tokio::test]
    async fn concurrent_fetches_share_one_request() {
        let cache = QueryCache::new();
        let key = key_for("dev-1");
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let key = key.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .fetch(&key, move |_| async move {
                        calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(json!("shared"))
                    })
                    .await
            }));
        }

        for handle in handles {
            let state = handle.await.unwrap();
            assert_eq!(state.data, Some(json!("shared")));
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let cache = QueryCache::new();
        cache.fetch(&key_for("dev-1"), |_| async { Ok(json!(1)) }).await;
        cache.fetch(&key_for("dev-2"), |_| async { Ok(json!(2)) }).await;
        assert_eq!(cache.len().await, 2);

        cache.clear().await;
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.state(&key_for("dev-1")).await.status, QueryStatus::Idle);
    }
}
