//! Normalized results of the open platform calls.
//!
//! Every result carries explicit `synthetic` flags per field group. A flag is
//! set when the value was generated locally instead of read from the upstream
//! payload, either because the payload lacked the field or because the whole
//! record is a fallback substitute.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scope::ScopeSet;

/// Provenance of a login-code exchange result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSynthetic {
    /// `open_id` / `union_id` were generated.
    pub identity: bool,
    /// `session_key` was generated.
    pub secret: bool,
}

impl SessionSynthetic {
    pub const fn all() -> Self {
        Self {
            identity: true,
            secret: true,
        }
    }

    #[inline]
    pub fn any(&self) -> bool {
        self.identity || self.secret
    }
}

/// Provenance of a token grant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSynthetic {
    /// `access_token` was generated, together with its refresh token.
    pub credentials: bool,
    /// `expires_in` was defaulted.
    pub expiry: bool,
    /// `scope` was defaulted.
    pub scope: bool,
}

impl TokenSynthetic {
    pub const fn all() -> Self {
        Self {
            credentials: true,
            expiry: true,
            scope: true,
        }
    }

    #[inline]
    pub fn any(&self) -> bool {
        self.credentials || self.expiry || self.scope
    }
}

/// Result of `code2session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionGrant {
    pub open_id: String,
    pub union_id: Option<String>,
    pub session_key: String,
    pub synthetic: SessionSynthetic,
    /// Upstream payload, kept for diagnostics only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// Result of a ticket exchange or a refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    /// Granted scopes. May be empty after a refresh that did not echo them.
    pub scope: ScopeSet,
    /// Open id echoed by the upstream, when present.
    pub open_id: Option<String>,
    pub synthetic: TokenSynthetic,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// Engagement counters attached to a video list item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoStatistics {
    pub play_count: u64,
    pub digg_count: u64,
    pub comment_count: u64,
    pub share_count: u64,
    pub forward_count: u64,
    pub download_count: u64,
}

/// One entry of the user's video list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoItem {
    pub item_id: String,
    pub title: String,
    pub cover: String,
    pub share_url: String,
    /// Unix timestamp (seconds).
    pub create_time: i64,
    /// Duration in seconds.
    pub duration: u64,
    pub is_top: bool,
    pub statistics: VideoStatistics,
}

/// One comment left by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub comment_id: String,
    pub text: String,
    /// Unix timestamp (seconds).
    pub create_time: i64,
    pub digg_count: u64,
    pub reply_count: u64,
    pub item_id: String,
    pub item_title: String,
    pub top: bool,
}

/// Participant of a private message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageUser {
    pub open_id: String,
    pub nickname: String,
    pub avatar: String,
}

/// One private message of the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub conversation_id: String,
    pub message_id: String,
    pub content: String,
    pub message_type: String,
    /// Unix timestamp (seconds).
    pub create_time: i64,
    pub from_user: MessageUser,
    pub to_user: MessageUser,
}

/// A cursor-paged list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor to pass for the next page.
    pub cursor: u64,
    pub has_more: bool,
    pub synthetic: bool,
}

pub type VideoPage = Page<VideoItem>;
pub type CommentPage = Page<Comment>;
pub type MessagePage = Page<Message>;

/// Thirty-day aggregate statistics of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStats {
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub plays: u64,
    pub avg_play_duration_secs: f64,
    pub synthetic: bool,
}

/// Public profile of the authorizing user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub open_id: String,
    pub nickname: String,
    pub avatar: String,
    /// 0 unknown, 1 male, 2 female.
    pub gender: u8,
    pub country: String,
    pub province: String,
    pub city: String,
    pub language: String,
    pub synthetic: bool,
}
