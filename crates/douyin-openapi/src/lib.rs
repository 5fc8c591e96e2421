//! Client for the Douyin open platform.
//!
//! Covers the two OAuth legs (login code and authorization ticket), token
//! refresh, and the video, comment and message lists plus the item-statistics
//! and user-info data calls.
//! Responses are normalized through ordered extractor lists and failures are
//! classified into [`ErrorClass`] so callers can decide whether a substitute
//! result is acceptable.

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod scope;
pub mod utils;

pub use client::OpenApiClient;
pub use config::UpstreamConfig;
pub use error::{ErrorClass, Operation, PERMISSION_ERROR_CODES, UpstreamError};
pub use models::{
    Comment, CommentPage, Message, MessagePage, MessageUser, Page, SessionGrant, SessionSynthetic,
    TokenGrant, TokenSynthetic, UserInfo, VideoItem, VideoPage, VideoStatistics, VideoStats,
};
pub use scope::ScopeSet;
pub use utils::mask;

/// Scope assumed for a ticket exchange whose answer does not list any.
pub const DEFAULT_GRANTED_SCOPE: &str = "ma.user.data,user_info";

/// Token lifetime assumed when the upstream omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 7200;

/// Largest page the list endpoints accept.
pub const MAX_PAGE_SIZE: u32 = 20;
