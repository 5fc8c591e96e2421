//! Broker error types.

use douyin_openapi::{Operation, UpstreamError};
use serde::Serialize;
use thiserror::Error;

use crate::scope::ScopeDenial;

/// Errors surfaced by the broker to its caller.
///
/// Transport and configuration failures only reach the caller when fallback
/// is disabled; otherwise they are absorbed into synthetic results.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// The upstream refused the credentials or the capability. Never faked.
    #[error("{operation} rejected by upstream: {message}")]
    Authorization {
        operation: Operation,
        message: String,
        upstream_code: Option<i64>,
        http_status: Option<u16>,
        remediation: Option<String>,
    },

    /// The granted scopes do not cover the operation.
    #[error("{0}")]
    ScopeDenied(ScopeDenial),

    /// The upstream could not be reached or answered unusably.
    #[error("{operation} failed: {message}")]
    Transport { operation: Operation, message: String },

    /// Upstream credentials are missing or a setting is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No usable session or token for the identifier.
    #[error("Not authenticated: {reason}")]
    Unauthenticated { reason: String },

    /// Malformed caller input.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{what} not found")]
    NotFound { what: String },
}

/// Coarse classification of a [`BrokerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authorization,
    ScopeDenied,
    Transport,
    Configuration,
    Unauthenticated,
    InvalidRequest,
    NotFound,
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::ScopeDenied(_) => ErrorKind::ScopeDenied,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// HTTP-equivalent status for the surrounding HTTP layer.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Authorization | ErrorKind::Unauthenticated => 401,
            ErrorKind::ScopeDenied => 403,
            ErrorKind::Transport | ErrorKind::Configuration => 500,
            ErrorKind::InvalidRequest => 400,
            ErrorKind::NotFound => 404,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authorization { .. } => "TOKEN_OR_PERMISSION_ERROR",
            Self::ScopeDenied(_) => "INSUFFICIENT_PERMISSIONS",
            Self::Transport { .. } => "UPSTREAM_UNAVAILABLE",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Unauthenticated { .. } => "UNAUTHENTICATED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::NotFound { what } if what == "session" => "SESSION_NOT_FOUND",
            Self::NotFound { .. } => "NOT_FOUND",
        }
    }

    /// Actionable text for the end user, when there is one.
    pub fn remediation(&self) -> Option<&str> {
        match self {
            Self::Authorization { remediation, .. } => remediation.as_deref(),
            Self::ScopeDenied(denial) => Some(denial.help.as_str()),
            _ => None,
        }
    }

    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization { .. })
    }
}

impl From<UpstreamError> for BrokerError {
    fn from(err: UpstreamError) -> Self {
        let message = err
            .upstream_message
            .clone()
            .unwrap_or_else(|| err.to_string());
        if err.is_authorization() {
            Self::Authorization {
                operation: err.operation,
                remediation: remediation(err.operation, err.upstream_code, err.http_status),
                message,
                upstream_code: err.upstream_code,
                http_status: err.http_status,
            }
        } else {
            Self::Transport {
                operation: err.operation,
                message,
            }
        }
    }
}

/// Remediation text for an authorization failure.
pub fn remediation(operation: Operation, code: Option<i64>, status: Option<u16>) -> Option<String> {
    let capability = match operation {
        Operation::GetUserInfo => "user_info",
        Operation::ListUserVideos => "video.list.bind",
        Operation::ListUserComments => "comment.list",
        Operation::ListUserMessages => "message.list",
        _ => "ma.item.data",
    };

    let text = match code {
        Some(28001018) => format!(
            "The app lacks the `{capability}` capability or its approval expired. \
             Re-apply for `{capability}` in the developer console, then ask the user to authorize again."
        ),
        Some(28001003) => {
            "The access_token is invalid or expired. Sign in again to obtain a new one.".to_string()
        }
        Some(2100004) => "The user has not granted `video.list.bind`. \
                          Ask the user to authorize video list access."
            .to_string(),
        Some(code) if douyin_openapi::PERMISSION_ERROR_CODES.contains(&code) => format!(
            "Upstream permission error {code}. Check that `{capability}` is granted to the app and re-authorize."
        ),
        _ => match status {
            Some(401 | 403) => "Sign in again to obtain a fresh authorization.".to_string(),
            _ => return None,
        },
    };
    Some(text)
}
