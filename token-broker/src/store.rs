//! Session and token stores.
//!
//! Both stores share one [`RecordCache`]; keys carry a per-store prefix so an
//! identifier never collides across the two.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use douyin_openapi::{ScopeSet, SessionGrant, SessionSynthetic, TokenGrant, TokenSynthetic};
use serde::Serialize;
use serde_json::Value;

use crate::cache::ExpiringCache;

const SESSION_PREFIX: &str = "session:";
const TOKEN_PREFIX: &str = "access_token:";

/// How long before upstream expiry a token disappears from the store.
pub const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// Session of one user, created by a login-code exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub external_user_id: String,
    pub federated_id: Option<String>,
    #[serde(skip_serializing)]
    pub session_secret: String,
    /// Insertion time, for display only.
    pub created_at: DateTime<Utc>,
    pub synthetic: SessionSynthetic,
}

impl SessionRecord {
    pub fn from_grant(grant: SessionGrant) -> Self {
        Self {
            external_user_id: grant.open_id,
            federated_id: grant.union_id,
            session_secret: grant.session_key,
            created_at: Utc::now(),
            synthetic: grant.synthetic,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic.any()
    }
}

/// Access token of one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenRecord {
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
    pub expires_in_secs: u64,
    pub scope: ScopeSet,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub raw_upstream_response: Option<Value>,
    pub synthetic: TokenSynthetic,
}

impl TokenRecord {
    pub fn from_grant(grant: TokenGrant) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_in_secs: grant.expires_in,
            scope: grant.scope,
            created_at: Utc::now(),
            raw_upstream_response: grant.raw,
            synthetic: grant.synthetic,
        }
    }

    /// The credentials were generated locally and must never be sent upstream.
    pub fn has_synthetic_credentials(&self) -> bool {
        self.synthetic.credentials
    }
}

/// Value stored in the shared cache.
#[derive(Debug, Clone)]
pub enum CachedRecord {
    Session(SessionRecord),
    Token(TokenRecord),
}

pub type RecordCache = ExpiringCache<CachedRecord>;

/// Store TTL of a token with the given upstream lifetime.
///
/// Degenerate lifetimes of five minutes or less still get one second.
pub fn token_ttl(expires_in_secs: u64) -> Duration {
    Duration::from_secs(
        expires_in_secs
            .saturating_sub(TOKEN_EXPIRY_MARGIN.as_secs())
            .max(1),
    )
}

#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<RecordCache>,
}

impl SessionStore {
    pub fn new(cache: Arc<RecordCache>) -> Self {
        Self { cache }
    }

    fn key(id: &str) -> String {
        format!("{SESSION_PREFIX}{id}")
    }

    /// Store a session, replacing any previous one for `id`.
    pub fn put(&self, id: &str, record: SessionRecord, ttl: Duration) {
        self.cache.set(Self::key(id), CachedRecord::Session(record), ttl);
    }

    pub fn get(&self, id: &str) -> Option<SessionRecord> {
        match self.cache.get(&Self::key(id))? {
            CachedRecord::Session(record) => Some(record),
            CachedRecord::Token(_) => None,
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        self.cache.delete(&Self::key(id))
    }

    pub fn remaining(&self, id: &str) -> Option<Duration> {
        self.cache.remaining_ttl(&Self::key(id))
    }
}

#[derive(Clone)]
pub struct TokenStore {
    cache: Arc<RecordCache>,
}

impl TokenStore {
    pub fn new(cache: Arc<RecordCache>) -> Self {
        Self { cache }
    }

    fn key(id: &str) -> String {
        format!("{TOKEN_PREFIX}{id}")
    }

    /// Store a token with an explicit TTL, replacing any previous one.
    pub fn put(&self, id: &str, record: TokenRecord, ttl: Duration) {
        self.cache.set(Self::key(id), CachedRecord::Token(record), ttl);
    }

    /// Store a token with the TTL derived from its lifetime.
    pub fn put_token(&self, id: &str, record: TokenRecord) {
        let ttl = token_ttl(record.expires_in_secs);
        self.put(id, record, ttl);
    }

    pub fn get(&self, id: &str) -> Option<TokenRecord> {
        match self.cache.get(&Self::key(id))? {
            CachedRecord::Token(record) => Some(record),
            CachedRecord::Session(_) => None,
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        self.cache.delete(&Self::key(id))
    }

    /// Time left before the token leaves the store.
    pub fn remaining(&self, id: &str) -> Option<Duration> {
        self.cache.remaining_ttl(&Self::key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;

    fn token(expires_in_secs: u64) -> TokenRecord {
        TokenRecord {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            expires_in_secs,
            scope: ScopeSet::parse("ma.item.data"),
            created_at: Utc::now(),
            raw_upstream_response: None,
            synthetic: TokenSynthetic::default(),
        }
    }

    fn session(id: &str) -> SessionRecord {
        SessionRecord {
            external_user_id: id.to_string(),
            federated_id: None,
            session_secret: "sk".to_string(),
            created_at: Utc::now(),
            synthetic: SessionSynthetic::default(),
        }
    }

    #[test]
    fn test_token_ttl_margin() {
        assert_eq!(token_ttl(7200), Duration::from_secs(6900));
        assert_eq!(token_ttl(300), Duration::from_secs(1));
        assert_eq!(token_ttl(0), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_lifetime_is_stored_without_overflow() {
        assert_eq!(
            token_ttl(u64::MAX),
            Duration::from_secs(u64::MAX - TOKEN_EXPIRY_MARGIN.as_secs())
        );

        let tokens = TokenStore::new(Arc::new(RecordCache::new()));
        tokens.put_token("u1", token(u64::MAX));
        assert_eq!(tokens.get("u1").unwrap().expires_in_secs, u64::MAX);
        assert!(tokens.remaining("u1").is_some());
    }

    #[test]
    fn test_token_leaves_store_five_minutes_early() {
        let clock = ManualClock::new();
        let cache = Arc::new(RecordCache::with_clock(Arc::new(clock.clone())));
        let tokens = TokenStore::new(cache);
        tokens.put_token("u1", token(7200));

        clock.advance(Duration::from_secs(6899));
        assert!(tokens.get("u1").is_some());

        clock.advance(Duration::from_secs(1));
        assert!(tokens.get("u1").is_none());
    }

    #[test]
    fn test_same_id_does_not_collide_across_stores() {
        let cache = Arc::new(RecordCache::new());
        let sessions = SessionStore::new(cache.clone());
        let tokens = TokenStore::new(cache.clone());

        sessions.put("u1", session("u1"), Duration::from_secs(60));
        tokens.put_token("u1", token(7200));
        assert_eq!(cache.len(), 2);

        assert!(tokens.remove("u1"));
        assert_eq!(sessions.get("u1").unwrap().external_user_id, "u1");
        assert!(tokens.get("u1").is_none());
    }

    #[test]
    fn test_put_replaces_record() {
        let tokens = TokenStore::new(Arc::new(RecordCache::new()));
        tokens.put_token("u1", token(7200));
        let mut replacement = token(3600);
        replacement.scope = ScopeSet::parse("user_info");
        tokens.put_token("u1", replacement);

        let stored = tokens.get("u1").unwrap();
        assert_eq!(stored.expires_in_secs, 3600);
        assert_eq!(stored.scope.to_vec(), vec!["user_info"]);
    }
}
