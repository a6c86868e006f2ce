//! Error taxonomy for the query layer.
//!
//! The split matters to callers: [`ApiError`] variants decide retry behavior
//! and user-facing presentation, while [`FilterError`] is raised locally
//! before any request is issued.

use serde_json::Value;
use thiserror::Error;

/// Failure raised by the transport boundary or request pipeline.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The exchange could not complete (connectivity loss, DNS, reset).
    #[error("request failed: {0}")]
    Network(String),

    /// The request was intentionally abandoned. Never user-visible and
    /// never recorded as an error state.
    #[error("request cancelled")]
    Cancelled,

    /// The server answered with a non-success status.
    #[error("{message} (status {status})")]
    Status {
        status: u16,
        message: String,
        /// Raw error payload, if the body parsed as JSON.
        payload: Option<Value>,
        /// Correlation id from the `x-request-id` header or a `requestId`
        /// payload field.
        request_id: Option<String>,
    },

    /// The response body could not be decoded into the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Network failures and 5xx responses are worth retrying with the same
    /// request. 4xx responses and decode failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }

    /// A 404 on an otherwise-valid optional endpoint means the capability
    /// does not exist for this resource; callers latch it off instead of
    /// retrying.
    pub fn is_unsupported(&self) -> bool {
        self.status() == Some(404)
    }

    /// 401/403 — surfaced distinctly as "requires elevated access".
    pub fn is_access_denied(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

/// Local validation failure, raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("time range is inverted: 'from' is after 'to'")]
    InvalidTimeRange,

    #[error("bounding box is malformed: {0}")]
    InvalidBoundingBox(String),

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// Everything a query operation can fail with.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
