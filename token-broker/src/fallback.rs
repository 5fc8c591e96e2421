//! Synthetic substitutes used when the upstream cannot serve a call.
//!
//! Every generated record is flagged synthetic through its provenance
//! fields, and every generated identifier starts with [`SYNTHETIC_PREFIX`].

use chrono::Utc;
use douyin_openapi::{
    Comment, CommentPage, Message, MessagePage, MessageUser, Page, ScopeSet, SessionGrant,
    SessionSynthetic, TokenGrant, TokenSynthetic, UserInfo, VideoItem, VideoPage, VideoStatistics,
    VideoStats,
};
use rand::RngExt;
use rand::distr::{Alphanumeric, SampleString};

use crate::scope::fallback_scopes;

pub const SYNTHETIC_PREFIX: &str = "mock_";

/// Number of items in the synthetic video corpus.
pub const VIDEO_CORPUS_SIZE: u64 = 100;
pub const COMMENT_CORPUS_SIZE: u64 = 200;
pub const MESSAGE_CORPUS_SIZE: u64 = 50;

pub const SYNTHETIC_EXPIRES_IN_SECS: u64 = 7200;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Unix timestamp `index` steps of `step_secs` before now.
fn seconds_ago(index: u64, step_secs: i64) -> i64 {
    let steps = i64::try_from(index).unwrap_or(i64::MAX);
    Utc::now()
        .timestamp()
        .saturating_sub(steps.saturating_mul(step_secs))
}

/// Page of a corpus of `size` entries starting at `cursor`.
fn corpus_page<T>(
    size: u64,
    cursor: u64,
    page_size: u32,
    entry: impl FnMut(u64) -> T,
) -> Page<T> {
    let start = cursor.min(size);
    let len = u64::from(page_size).min(size - start);
    let next = start + len;

    Page {
        items: (start..next).map(entry).collect(),
        cursor: next,
        has_more: next < size,
        synthetic: true,
    }
}

fn synthetic_id(kind: &str, len: usize) -> String {
    format!(
        "{SYNTHETIC_PREFIX}{kind}_{}",
        Alphanumeric.sample_string(&mut rand::rng(), len)
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackGenerator;

impl FallbackGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn session(&self) -> SessionGrant {
        SessionGrant {
            open_id: synthetic_id("openid", 9),
            union_id: Some(synthetic_id("unionid", 9)),
            session_key: synthetic_id("session_key", 16),
            synthetic: SessionSynthetic::all(),
            raw: None,
        }
    }

    /// Token granting every scope the broker checks for.
    pub fn token(&self) -> TokenGrant {
        self.token_with("access_token", "refresh_token")
    }

    pub fn refreshed_token(&self) -> TokenGrant {
        self.token_with("refreshed_access_token", "refreshed_refresh_token")
    }

    fn token_with(&self, access_kind: &str, refresh_kind: &str) -> TokenGrant {
        TokenGrant {
            access_token: synthetic_id(access_kind, 32),
            refresh_token: synthetic_id(refresh_kind, 32),
            expires_in: SYNTHETIC_EXPIRES_IN_SECS,
            scope: fallback_scopes(),
            open_id: None,
            synthetic: TokenSynthetic::all(),
            raw: None,
        }
    }

    /// Page of the synthetic corpus starting at `cursor`.
    pub fn video_page(&self, cursor: u64, page_size: u32) -> VideoPage {
        corpus_page(VIDEO_CORPUS_SIZE, cursor, page_size, synthetic_video)
    }

    pub fn comment_page(&self, cursor: u64, page_size: u32) -> CommentPage {
        corpus_page(COMMENT_CORPUS_SIZE, cursor, page_size, synthetic_comment)
    }

    /// Messages addressed to `open_id`.
    pub fn message_page(&self, open_id: &str, cursor: u64, page_size: u32) -> MessagePage {
        corpus_page(MESSAGE_CORPUS_SIZE, cursor, page_size, |index| {
            synthetic_message(open_id, index)
        })
    }

    pub fn video_stats(&self, _item_id: &str) -> VideoStats {
        let mut rng = rand::rng();
        VideoStats {
            likes: rng.random_range(100..1100),
            comments: rng.random_range(20..220),
            shares: rng.random_range(5..55),
            plays: rng.random_range(500..5500),
            avg_play_duration_secs: f64::from(rng.random_range(15u32..75)),
            synthetic: true,
        }
    }

    pub fn user_info(&self, open_id: &str) -> UserInfo {
        UserInfo {
            open_id: open_id.to_string(),
            nickname: "Test user".to_string(),
            avatar: "https://example.com/avatar.png".to_string(),
            gender: 1,
            country: "China".to_string(),
            province: "Beijing".to_string(),
            city: "Beijing".to_string(),
            language: "zh_CN".to_string(),
            synthetic: true,
        }
    }

    /// Granted scopes of every synthetic token.
    pub fn scopes(&self) -> ScopeSet {
        fallback_scopes()
    }
}

fn synthetic_video(index: u64) -> VideoItem {
    let mut rng = rand::rng();
    VideoItem {
        item_id: format!("{SYNTHETIC_PREFIX}video_{index}"),
        title: format!("Synthetic video {}", index + 1),
        cover: format!("https://example.com/mock/cover_{index}.jpg"),
        share_url: format!("https://example.com/mock/video_{index}"),
        create_time: seconds_ago(index, SECS_PER_DAY),
        duration: rng.random_range(15..75),
        is_top: index < 3,
        statistics: VideoStatistics {
            play_count: rng.random_range(0..100_000),
            digg_count: rng.random_range(0..10_000),
            comment_count: rng.random_range(0..1_000),
            share_count: rng.random_range(0..500),
            forward_count: 0,
            download_count: 0,
        },
    }
}

fn synthetic_comment(index: u64) -> Comment {
    let mut rng = rand::rng();
    Comment {
        comment_id: format!("{SYNTHETIC_PREFIX}comment_{index}"),
        text: format!("Synthetic comment {}", index + 1),
        create_time: seconds_ago(index, 60 * 60),
        digg_count: rng.random_range(0..100),
        reply_count: rng.random_range(0..20),
        item_id: format!("{SYNTHETIC_PREFIX}video_{}", index / 5),
        item_title: format!("Synthetic video {}", index / 5 + 1),
        top: index < 5,
    }
}

fn synthetic_message(open_id: &str, index: u64) -> Message {
    let mut rng = rand::rng();
    let sender = rng.random_range(0..100u32);
    Message {
        conversation_id: format!("{SYNTHETIC_PREFIX}conv_{}", index / 3),
        message_id: format!("{SYNTHETIC_PREFIX}msg_{index}"),
        content: format!("Synthetic message {}", index + 1),
        message_type: "text".to_string(),
        create_time: seconds_ago(index, 30 * 60),
        from_user: MessageUser {
            open_id: format!("{SYNTHETIC_PREFIX}user_{sender}"),
            nickname: format!("Synthetic user {sender}"),
            avatar: format!(
                "https://example.com/mock/avatar_{}.jpg",
                rng.random_range(0..10u32)
            ),
        },
        to_user: MessageUser {
            open_id: open_id.to_string(),
            nickname: "Current user".to_string(),
            avatar: String::new(),
        },
    }
}
