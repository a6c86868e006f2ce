//! Cursor pagination engine for unbounded event streams.
//!
//! One pager instance owns the loaded prefix of one logical stream, per
//! `(kind, filter)` pair. Pages are strictly append-only; changing the
//! filter throws the whole stream away because cursors are only meaningful
//! relative to the filter that produced them.

use async_trait::async_trait;
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::error::QueryError;
use crate::models::{EventRecord, Page};
use crate::transport;

use super::client::QueryClient;
use super::filter::FilterSet;

/// Where pages come from. The seam exists so tests can script a stream
/// without a transport.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch_page(
        &self,
        filter: &FilterSet,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Page<T>, QueryError>;
}

/// Event pages via the query client's transport.
pub struct EventSource {
    client: QueryClient,
}

#[async_trait]
impl PageSource<EventRecord> for EventSource {
    async fn fetch_page(
        &self,
        filter: &FilterSet,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Page<EventRecord>, QueryError> {
        let body = self.client.fetch_page_body(filter, cursor, cancel).await?;
        Ok(transport::decode(body)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerStatus {
    Idle,
    Loading,
    Ready,
    LoadingMore,
    Exhausted,
    Error,
}

pub struct Pager<T, S: PageSource<T>> {
    source: S,
    filter: FilterSet,
    status: PagerStatus,
    pages: Vec<Page<T>>,
    next_cursor: Option<String>,
    last_error: Option<QueryError>,
    /// Fired on teardown so an in-flight page request can be abandoned;
    /// replaced whenever the stream restarts.
    cancel: CancellationToken,
}

pub type EventPager = Pager<EventRecord, EventSource>;

impl EventPager {
    pub fn events(client: QueryClient, filter: FilterSet) -> Self {
        Self::new(EventSource { client }, filter)
    }
}

impl<T, S: PageSource<T>> Pager<T, S> {
    pub fn new(source: S, filter: FilterSet) -> Self {
        Self {
            source,
            filter,
            status: PagerStatus::Idle,
            pages: Vec::new(),
            next_cursor: None,
            last_error: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn status(&self) -> PagerStatus {
        self.status
    }

    /// Token fired by [`cancel`](Self::cancel). Clones can be held by
    /// whoever drives teardown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abandons the in-flight page request, if any. Cancellation is silent:
    /// the pager resumes in the state it was in before the request, and the
    /// next [`load_first_page`](Self::load_first_page) starts fresh.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn last_error(&self) -> Option<&QueryError> {
        self.last_error.as_ref()
    }

    pub fn filter(&self) -> &FilterSet {
        &self.filter
    }

    /// All loaded items in load order. Ordering within and across pages is
    /// server-determined and preserved verbatim; nothing here re-sorts.
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|page| page.items.iter())
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|page| page.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct values over the *loaded prefix only*, first-seen order.
    /// Explicitly partial: more pages may add more values.
    pub fn distinct_by<K, F>(&self, select: F) -> Vec<K>
    where
        K: PartialEq,
        F: Fn(&T) -> Option<K>,
    {
        let mut seen: Vec<K> = Vec::new();
        for item in self.items() {
            if let Some(key) = select(item) {
                if !seen.contains(&key) {
                    seen.push(key);
                }
            }
        }
        seen
    }

    /// Loads (or reloads) the first page. While a load is already in
    /// flight the call is a no-op; single ownership means that can only
    /// happen through re-entrant misuse, which we degrade gracefully on.
    pub async fn load_first_page(&mut self) -> Result<(), QueryError> {
        if matches!(self.status, PagerStatus::Loading | PagerStatus::LoadingMore) {
            return Ok(());
        }
        self.filter.validate()?;

        self.pages.clear();
        self.next_cursor = None;
        self.last_error = None;
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.status = PagerStatus::Loading;

        let cancel = self.cancel.clone();
        match self.source.fetch_page(&self.filter, None, &cancel).await {
            Ok(page) => {
                self.next_cursor = page.next_cursor.clone();
                self.status = if page.is_last() {
                    PagerStatus::Exhausted
                } else {
                    PagerStatus::Ready
                };
                self.pages.push(page);
                Ok(())
            }
            Err(err) => self.record_failure(err, PagerStatus::Idle),
        }
    }

    /// Extends the stream by one page. A no-op — issuing no request —
    /// unless the pager is `Ready` with a continuation cursor, which also
    /// coalesces calls arriving while a next-page load is outstanding.
    pub async fn load_next_page(&mut self) -> Result<(), QueryError> {
        if self.status != PagerStatus::Ready {
            debug!("load_next_page ignored in state {:?}", self.status);
            return Ok(());
        }
        let Some(cursor) = self.next_cursor.clone() else {
            return Ok(());
        };

        self.status = PagerStatus::LoadingMore;

        let cancel = self.cancel.clone();
        match self.source.fetch_page(&self.filter, Some(&cursor), &cancel).await {
            Ok(page) => {
                self.next_cursor = page.next_cursor.clone();
                self.status = if page.is_last() {
                    PagerStatus::Exhausted
                } else {
                    PagerStatus::Ready
                };
                // Append in place; earlier pages are never replaced.
                self.pages.push(page);
                Ok(())
            }
            Err(err) => self.record_failure(err, PagerStatus::Ready),
        }
    }

    /// Replaces the filter and discards the entire stream. Previously
    /// loaded pages are never reused across filters.
    pub fn set_filter(&mut self, filter: FilterSet) {
        if filter == self.filter {
            return;
        }
        // A page still in flight belongs to the old filter.
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.filter = filter;
        self.pages.clear();
        self.next_cursor = None;
        self.last_error = None;
        self.status = PagerStatus::Idle;
    }

    /// Manual retry from the error state: reloads from scratch when the
    /// first page failed, otherwise re-attempts the next page.
    pub async fn retry(&mut self) -> Result<(), QueryError> {
        if self.status != PagerStatus::Error {
            return Ok(());
        }
        self.last_error = None;
        if self.pages.is_empty() {
            self.status = PagerStatus::Idle;
            self.load_first_page().await
        } else {
            self.status = PagerStatus::Ready;
            self.load_next_page().await
        }
    }

    fn record_failure(
        &mut self,
        err: QueryError,
        resume_status: PagerStatus,
    ) -> Result<(), QueryError> {
        if let QueryError::Api(api) = &err {
            if api.is_cancelled() {
                // Abandonment is not an error; fall back to the state the
                // pager was in before the request.
                self.status = resume_status;
                return Ok(());
            }
        }
        self.status = PagerStatus::Error;
        self.last_error = Some(err.clone());
        Err(err)
    }
}
