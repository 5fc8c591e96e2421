//! Response-shape probing.
//!
//! The open platform has answered the same endpoint with several layouts over
//! time: flat fields, a `data` envelope, camelCase names, alternative id
//! fields. Every layout is a pure extractor `fn(&Value) -> Option<T>`; callers
//! walk an ordered extractor list with [`first_match`] and keep the first hit.

use serde_json::Value;

use crate::scope::ScopeSet;

/// A pure extractor over a decoded response body.
pub type Extractor<T> = fn(&Value) -> Option<T>;

/// A named extractor, the name is logged when it matches.
pub type NamedExtractor<T> = (&'static str, Extractor<T>);

/// Resolve a dotted path (`data.extra.error_code`) inside a JSON value.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, key| current.get(key))
}

/// Non-empty string at `path`. Numbers are rendered as strings.
pub fn non_empty_string(value: &Value, path: &str) -> Option<String> {
    match lookup(value, path)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First non-empty string among several candidate paths.
pub fn first_string(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| non_empty_string(value, path))
}

/// Unsigned integer at `path`, accepting numeric strings and floats.
pub fn unsigned(value: &Value, path: &str) -> Option<u64> {
    match lookup(value, path)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Signed integer at `path`, accepting numeric strings.
pub fn signed(value: &Value, path: &str) -> Option<i64> {
    match lookup(value, path)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Floating point value at `path`.
pub fn float(value: &Value, path: &str) -> Option<f64> {
    match lookup(value, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Boolean at `path`; numbers are truthy when non-zero.
pub fn flag(value: &Value, path: &str) -> Option<bool> {
    match lookup(value, path)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

/// Run extractors in order, returning the first match and its layout name.
pub fn first_match<T>(
    body: &Value,
    extractors: &[NamedExtractor<T>],
) -> Option<(&'static str, T)> {
    extractors
        .iter()
        .find_map(|(name, extract)| extract(body).map(|fields| (*name, fields)))
}

// ========== code2session ==========

/// Identity fields read from a login-code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFields {
    pub open_id: String,
    pub union_id: Option<String>,
    pub session_key: Option<String>,
}

struct SessionLayout {
    open_id: &'static str,
    union_id: &'static str,
    session_key: &'static str,
}

impl SessionLayout {
    fn extract(&self, body: &Value) -> Option<SessionFields> {
        let open_id = non_empty_string(body, self.open_id)?;
        Some(SessionFields {
            open_id,
            union_id: non_empty_string(body, self.union_id),
            session_key: non_empty_string(body, self.session_key),
        })
    }
}

pub fn session_flat(body: &Value) -> Option<SessionFields> {
    SessionLayout {
        open_id: "openid",
        union_id: "unionid",
        session_key: "session_key",
    }
    .extract(body)
}

pub fn session_data_envelope(body: &Value) -> Option<SessionFields> {
    SessionLayout {
        open_id: "data.openid",
        union_id: "data.unionid",
        session_key: "data.session_key",
    }
    .extract(body)
}

pub fn session_data_open_id(body: &Value) -> Option<SessionFields> {
    SessionLayout {
        open_id: "data.open_id",
        union_id: "data.union_id",
        session_key: "data.session_key",
    }
    .extract(body)
}

pub fn session_open_id(body: &Value) -> Option<SessionFields> {
    SessionLayout {
        open_id: "open_id",
        union_id: "union_id",
        session_key: "sessionKey",
    }
    .extract(body)
}

pub fn session_user_id(body: &Value) -> Option<SessionFields> {
    SessionLayout {
        open_id: "user_id",
        union_id: "union_id",
        session_key: "session_key",
    }
    .extract(body)
}

pub fn session_id(body: &Value) -> Option<SessionFields> {
    SessionLayout {
        open_id: "id",
        union_id: "unionid",
        session_key: "session_key",
    }
    .extract(body)
}

pub const SESSION_EXTRACTORS: &[NamedExtractor<SessionFields>] = &[
    ("flat", session_flat),
    ("data_envelope", session_data_envelope),
    ("data_open_id", session_data_open_id),
    ("open_id", session_open_id),
    ("user_id", session_user_id),
    ("id", session_id),
];

// ========== access_token / refresh_token ==========

/// Token fields read from a ticket exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenFields {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub scope: Option<ScopeSet>,
    pub open_id: Option<String>,
}

/// Longest token lifetime accepted from a payload; larger values are capped.
pub const MAX_EXPIRES_IN_SECS: u64 = 365 * 24 * 60 * 60;

struct TokenLayout {
    envelope: Option<&'static str>,
    access_token: &'static str,
    refresh_token: &'static str,
    expires_in: &'static str,
}

impl TokenLayout {
    fn extract(&self, body: &Value) -> Option<TokenFields> {
        let scoped = match self.envelope {
            Some(envelope) => lookup(body, envelope)?,
            None => body,
        };
        let access_token = non_empty_string(scoped, self.access_token)?;
        Some(TokenFields {
            access_token,
            refresh_token: non_empty_string(scoped, self.refresh_token),
            expires_in: unsigned(scoped, self.expires_in)
                .filter(|secs| *secs > 0)
                .map(|secs| secs.min(MAX_EXPIRES_IN_SECS)),
            scope: ScopeSet::from_payload(scoped).filter(|scope| !scope.is_empty()),
            open_id: first_string(scoped, &["open_id", "openid"]),
        })
    }
}

pub fn token_flat(body: &Value) -> Option<TokenFields> {
    TokenLayout {
        envelope: None,
        access_token: "access_token",
        refresh_token: "refresh_token",
        expires_in: "expires_in",
    }
    .extract(body)
}

pub fn token_data_envelope(body: &Value) -> Option<TokenFields> {
    TokenLayout {
        envelope: Some("data"),
        access_token: "access_token",
        refresh_token: "refresh_token",
        expires_in: "expires_in",
    }
    .extract(body)
}

pub fn token_camel_case(body: &Value) -> Option<TokenFields> {
    TokenLayout {
        envelope: None,
        access_token: "accessToken",
        refresh_token: "refreshToken",
        expires_in: "expiresIn",
    }
    .extract(body)
}

pub fn token_short(body: &Value) -> Option<TokenFields> {
    TokenLayout {
        envelope: None,
        access_token: "token",
        refresh_token: "refresh",
        expires_in: "expire",
    }
    .extract(body)
}

pub const TOKEN_EXTRACTORS: &[NamedExtractor<TokenFields>] = &[
    ("flat", token_flat),
    ("data_envelope", token_data_envelope),
    ("camel_case", token_camel_case),
    ("short", token_short),
];

// ========== cursor-paged lists ==========

/// Raw page fields read from a cursor-paged list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct PageFields {
    pub items: Vec<Value>,
    pub cursor: Option<u64>,
    pub has_more: Option<bool>,
}

fn page_at(body: &Value, prefix: &str) -> Option<PageFields> {
    let path = |field: &str| {
        if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        }
    };
    let items = lookup(body, &path("list"))?.as_array()?.clone();
    Some(PageFields {
        items,
        cursor: unsigned(body, &path("cursor")),
        has_more: flag(body, &path("has_more")),
    })
}

pub fn page_data_envelope(body: &Value) -> Option<PageFields> {
    page_at(body, "data")
}

pub fn page_flat(body: &Value) -> Option<PageFields> {
    page_at(body, "")
}

/// `data` is the list itself, paging fields sit beside it.
pub fn page_data_array(body: &Value) -> Option<PageFields> {
    let items = body.get("data")?.as_array()?.clone();
    Some(PageFields {
        items,
        cursor: unsigned(body, "cursor"),
        has_more: flag(body, "has_more"),
    })
}

pub const PAGE_EXTRACTORS: &[NamedExtractor<PageFields>] = &[
    ("data_envelope", page_data_envelope),
    ("data_array", page_data_array),
    ("flat", page_flat),
];

// ========== item base data ==========

/// Statistics read from the item base-data endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsFields {
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub plays: u64,
    pub avg_play_duration_secs: f64,
}

fn stats_from(result: &Value) -> StatsFields {
    StatsFields {
        likes: unsigned(result, "total_like").unwrap_or(0),
        comments: unsigned(result, "total_comment").unwrap_or(0),
        shares: unsigned(result, "total_share").unwrap_or(0),
        plays: unsigned(result, "total_play").unwrap_or(0),
        avg_play_duration_secs: float(result, "avg_play_duration").unwrap_or(0.0),
    }
}

pub fn stats_nested_result(body: &Value) -> Option<StatsFields> {
    lookup(body, "data.data.result")
        .filter(|v| v.is_object())
        .map(stats_from)
}

pub fn stats_data_result(body: &Value) -> Option<StatsFields> {
    lookup(body, "data.result")
        .filter(|v| v.is_object())
        .map(stats_from)
}

pub fn stats_flat(body: &Value) -> Option<StatsFields> {
    ["total_like", "total_play"]
        .iter()
        .any(|field| body.get(field).is_some())
        .then(|| stats_from(body))
}

pub const STATS_EXTRACTORS: &[NamedExtractor<StatsFields>] = &[
    ("nested_result", stats_nested_result),
    ("data_result", stats_data_result),
    ("flat", stats_flat),
];

// ========== user info ==========

/// Profile fields read from the user info endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfoFields {
    pub open_id: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub gender: u8,
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub language: Option<String>,
}

fn user_info_at(scoped: &Value) -> Option<UserInfoFields> {
    let open_id = first_string(scoped, &["openid", "open_id"]);
    let nickname = first_string(scoped, &["nickname", "nick_name"]);
    if open_id.is_none() && nickname.is_none() {
        return None;
    }
    Some(UserInfoFields {
        open_id,
        nickname,
        avatar: first_string(scoped, &["avatar", "avatar_url", "headimgurl"]),
        gender: unsigned(scoped, "gender")
            .and_then(|g| u8::try_from(g).ok())
            .unwrap_or(0),
        country: non_empty_string(scoped, "country"),
        province: non_empty_string(scoped, "province"),
        city: non_empty_string(scoped, "city"),
        language: non_empty_string(scoped, "language"),
    })
}

pub fn user_info_data_envelope(body: &Value) -> Option<UserInfoFields> {
    lookup(body, "data").and_then(user_info_at)
}

pub fn user_info_flat(body: &Value) -> Option<UserInfoFields> {
    user_info_at(body)
}

pub const USER_INFO_EXTRACTORS: &[NamedExtractor<UserInfoFields>] = &[
    ("data_envelope", user_info_data_envelope),
    ("flat", user_info_flat),
];
