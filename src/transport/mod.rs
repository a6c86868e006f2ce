//! Boundary between the query layer and the network.
//!
//! The core only depends on the [`Transport`] trait: "send this request,
//! honoring this cancellation token, and give me parsed JSON or a typed
//! failure". The reqwest-backed implementation lives in [`http`]; tests
//! substitute scripted transports.

pub mod http;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};
use crate::models::ListEnvelope;

pub use http::HttpTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

/// A single HTTP-like exchange. Query parameters are pre-rendered strings;
/// absent filter fields are simply not present in `query` (never sent as
/// empty strings).
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: String,
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::Get,
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Issues requests on behalf of the query layer.
///
/// `Ok(None)` means the exchange succeeded with an empty body. Non-success
/// statuses surface as [`ApiError::Status`]; a fired token surfaces as
/// [`ApiError::Cancelled`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> ApiResult<Option<Value>>;
}

/// Sends a request with bounded retries for retryable failures (network
/// loss, 5xx). The same request is reissued verbatim; cancellation and
/// definitive failures (4xx, decode) return immediately.
pub async fn send_with_retry(
    transport: &dyn Transport,
    request: &ApiRequest,
    cancel: &CancellationToken,
    max_retries: u32,
) -> ApiResult<Option<Value>> {
    let attempts = max_retries.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match transport.send(request, cancel).await {
            Ok(body) => return Ok(body),
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) if err.is_retryable() && attempt < attempts => {
                log::warn!(
                    "request to {} failed (attempt {attempt}/{attempts}): {err}",
                    request.path
                );
                // Linear backoff; cancellation cuts the wait short.
                let wait = Duration::from_millis(250 * u64::from(attempt));
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err.unwrap_or_else(|| ApiError::Network("retries exhausted".into())))
}

/// Decodes a response body into a concrete type. An empty body is a decode
/// failure here: callers that expect no body don't decode.
pub fn decode<T: DeserializeOwned>(body: Option<Value>) -> ApiResult<T> {
    let value = body.ok_or_else(|| ApiError::Decode("response body was empty".into()))?;
    serde_json::from_value(value).map_err(|err| ApiError::Decode(err.to_string()))
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ListResponse<T> {
    Enveloped { items: Vec<T>, count: Option<u64> },
    Bare(Vec<T>),
}

/// Normalizes a list response to the enveloped form. Endpoints historically
/// disagree on whether they answer `[...]` or `{items, count}`; nothing past
/// this function ever sees the bare form.
pub fn decode_list<T: DeserializeOwned>(body: Option<Value>) -> ApiResult<ListEnvelope<T>> {
    let value = body.ok_or_else(|| ApiError::Decode("response body was empty".into()))?;
    match serde_json::from_value::<ListResponse<T>>(value) {
        Ok(ListResponse::Enveloped { items, count }) => Ok(ListEnvelope { items, count }),
        Ok(ListResponse::Bare(items)) => Ok(ListEnvelope { items, count: None }),
        Err(err) => Err(ApiError::Decode(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_decode_accepts_bare_array() {
        let envelope: ListEnvelope<u32> = decode_list(Some(json!([1, 2, 3]))).unwrap();
        assert_eq!(envelope.items, vec![1, 2, 3]);
        assert_eq!(envelope.count, None);
    }

    #[test]
    fn list_decode_accepts_envelope() {
        let envelope: ListEnvelope<u32> =
            decode_list(Some(json!({"items": [4], "count": 17}))).unwrap();
        assert_eq!(envelope.items, vec![4]);
        assert_eq!(envelope.count, Some(17));
    }

    #[test]
    fn list_decode_rejects_empty_body() {
        let result: ApiResult<ListEnvelope<u32>> = decode_list(None);
        assert!(matches!(result, Err(ApiError::Decode(_))));
    }

    #[test]
    fn decode_reads_concrete_type() {
        let n: u64 = decode(Some(json!(42))).unwrap();
        assert_eq!(n, 42);
    }
}
