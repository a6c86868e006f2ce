//! reqwest-backed [`Transport`].

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

use super::{ApiRequest, Method, Transport};

const REQUEST_ID_HEADER: &str = "x-request-id";
const API_KEY_HEADER: &str = "x-api-key";

/// HTTP transport against the dashboard backend.
///
/// Attaches a fresh v4 request id to every exchange so failures can be
/// correlated with backend logs, and injects the API key when one was
/// configured at startup.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> ApiResult<Option<Value>> {
        let url = self.url_for(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key.as_str());
        }
        builder = builder.header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            result = builder.send() => {
                result.map_err(|err| ApiError::Network(err.to_string()))?
            }
        };

        let status = response.status();
        let header_request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            result = response.text() => {
                result.map_err(|err| ApiError::Network(err.to_string()))?
            }
        };

        if status.is_success() {
            return Ok(parse_success_body(&text));
        }

        let payload: Option<Value> = serde_json::from_str(&text).ok();
        let message = extract_error_message(payload.as_ref()).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
        let request_id = header_request_id.or_else(|| {
            payload
                .as_ref()
                .and_then(|p| p.get("requestId"))
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        Err(ApiError::Status {
            status: status.as_u16(),
            message,
            payload,
            request_id,
        })
    }
}

/// Success bodies are usually JSON, but health/plain-text endpoints exist;
/// a non-JSON body comes back as a JSON string, an empty one as `None`.
fn parse_success_body(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(text.to_string())),
    }
}

/// Pulls the human-readable message out of an error payload: a `message` or
/// `error` field holding either a string or an array of strings.
fn extract_error_message(payload: Option<&Value>) -> Option<String> {
    let payload = payload?;
    let field = payload.get("message").or_else(|| payload.get("error"))?;
    match field {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let lines: Vec<&str> = parts.iter().filter_map(Value::as_str).collect();
            if lines.is_empty() {
                None
            } else {
                Some(lines.join("; "))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_message_from_string_field() {
        let payload = json!({"message": "device not found"});
        assert_eq!(
            extract_error_message(Some(&payload)),
            Some("device not found".to_string())
        );
    }

    #[test]
    fn error_message_from_error_field() {
        let payload = json!({"error": "bad request"});
        assert_eq!(
            extract_error_message(Some(&payload)),
            Some("bad request".to_string())
        );
    }

    #[test]
    fn error_message_joins_string_arrays() {
        let payload = json!({"message": ["limit must be positive", "unknown source"]});
        assert_eq!(
            extract_error_message(Some(&payload)),
            Some("limit must be positive; unknown source".to_string())
        );
    }

    #[test]
    fn error_message_absent_for_other_shapes() {
        assert_eq!(extract_error_message(Some(&json!({"code": 7}))), None);
        assert_eq!(extract_error_message(None), None);
    }

    #[test]
    fn success_body_parsing() {
        assert_eq!(parse_success_body(""), None);
        assert_eq!(parse_success_body("  "), None);
        assert_eq!(parse_success_body("{\"a\":1}"), Some(json!({"a": 1})));
        assert_eq!(parse_success_body("ok"), Some(json!("ok")));
    }

    #[test]
    fn url_joining_normalizes_slashes() {
        let transport = HttpTransport::new("http://localhost:8080/", None);
        assert_eq!(
            transport.url_for("/api/measurements"),
            "http://localhost:8080/api/measurements"
        );
    }
}
