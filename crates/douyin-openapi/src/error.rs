//! Upstream failure classification.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::extract::{non_empty_string, signed};

/// Payload error codes the open platform uses for missing or revoked permissions.
pub const PERMISSION_ERROR_CODES: &[i64] = &[
    28001003, // access_token invalid
    28001005,
    28001006,
    28001007,
    28001008,
    28001014,
    28001016,
    28001018, // capability not approved or expired
    28001019,
    28003017,
    2100004, // video.list.bind not granted
];

/// Where a payload error code may appear, in lookup order.
const ERROR_CODE_PATHS: &[&str] = &[
    "err_no",
    "error_code",
    "data.error_code",
    "extra.error_code",
    "data.extra.error_code",
];

const ERROR_MESSAGE_PATHS: &[&str] = &[
    "err_msg",
    "error_description",
    "description",
    "data.description",
    "data.extra.description",
    "extra.description",
];

/// Upstream call performed by the client.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ExchangeLoginCode,
    ExchangeAuthTicket,
    RefreshToken,
    ListUserVideos,
    ListUserComments,
    ListUserMessages,
    GetVideoStats,
    GetUserInfo,
}

/// How a failed call is treated by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The upstream refused the credentials or the permission. Never faked.
    Authorization,
    /// Network, timeout, non-2xx or unreadable payload.
    Transport,
    /// A 2xx answer whose payload is not a JSON object.
    Unknown,
}

/// A classified upstream failure.
#[derive(Debug, Clone, Error, Serialize)]
#[error(
    "{operation} failed ({class}): {}",
    .upstream_message.as_deref().unwrap_or("no detail")
)]
pub struct UpstreamError {
    pub class: ErrorClass,
    pub operation: Operation,
    pub http_status: Option<u16>,
    pub upstream_code: Option<i64>,
    pub upstream_message: Option<String>,
}

impl UpstreamError {
    pub fn new(class: ErrorClass, operation: Operation) -> Self {
        Self {
            class,
            operation,
            http_status: None,
            upstream_code: None,
            upstream_message: None,
        }
    }

    pub fn transport(operation: Operation, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transport, operation).with_message(message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: Option<i64>) -> Self {
        self.upstream_code = code;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.upstream_message = Some(message.into());
        self
    }

    /// Map a `reqwest` failure. Timeouts and connection errors are transport faults.
    pub fn from_reqwest(operation: Operation, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        let mut classified = Self::transport(operation, message);
        if let Some(status) = err.status() {
            classified = classified.with_status(status.as_u16());
        }
        classified
    }

    #[inline]
    pub fn is_authorization(&self) -> bool {
        self.class == ErrorClass::Authorization
    }
}

/// First non-zero payload error code.
pub fn payload_error_code(body: &Value) -> Option<i64> {
    ERROR_CODE_PATHS
        .iter()
        .filter_map(|path| signed(body, path))
        .find(|code| *code != 0)
}

/// Best available human-readable error message of a payload.
pub fn payload_error_message(body: &Value) -> Option<String> {
    ERROR_MESSAGE_PATHS
        .iter()
        .find_map(|path| non_empty_string(body, path))
}

/// Non-empty OAuth `error` field.
pub fn oauth_error(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[inline]
pub fn is_permission_code(code: i64) -> bool {
    PERMISSION_ERROR_CODES.contains(&code)
}

/// Classify an error signalled inside a decoded payload.
///
/// Returns `None` when the payload does not report an error.
pub fn classify_payload(operation: Operation, body: &Value) -> Option<UpstreamError> {
    let code = payload_error_code(body);
    let oauth = oauth_error(body);

    let class = match (code, &oauth) {
        (Some(code), _) if is_permission_code(code) => ErrorClass::Authorization,
        (_, Some(_)) => ErrorClass::Authorization,
        (Some(_), None) => ErrorClass::Transport,
        (None, None) => return None,
    };

    let message = payload_error_message(body)
        .or(oauth)
        .unwrap_or_else(|| "upstream reported an error".to_string());

    Some(
        UpstreamError::new(class, operation)
            .with_code(code)
            .with_message(message),
    )
}

/// Classify a non-2xx or 401/403 HTTP answer, using the payload when it was readable.
pub fn classify_status(operation: Operation, status: u16, body: Option<&Value>) -> UpstreamError {
    let from_payload = body.and_then(|body| classify_payload(operation, body));
    let class = match (status, &from_payload) {
        (401 | 403, _) => ErrorClass::Authorization,
        (_, Some(err)) => err.class,
        _ => ErrorClass::Transport,
    };

    let (code, message) = match from_payload {
        Some(err) => (err.upstream_code, err.upstream_message),
        None => (None, Some(format!("upstream answered HTTP {status}"))),
    };

    let mut classified = UpstreamError::new(class, operation)
        .with_status(status)
        .with_code(code);
    classified.upstream_message = message;
    classified
}
