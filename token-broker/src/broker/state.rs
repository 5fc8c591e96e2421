use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheStats;
use crate::store::{SessionRecord, TokenRecord};

/// A token whose store TTL falls within this window is refreshed on next use.
pub const EXPIRING_WINDOW: Duration = Duration::from_secs(300);

/// Authorization state of one identifier, derived from store contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No session and no token.
    Anonymous,
    /// A session, but no token with granted scopes.
    Authenticated,
    /// A token with a non-empty scope.
    Authorized,
    /// A token close to leaving the store.
    Expiring,
}

impl AuthState {
    pub fn resolve(has_session: bool, token: Option<(&TokenRecord, Duration)>) -> Self {
        match token {
            Some((_, remaining)) if remaining <= EXPIRING_WINDOW => Self::Expiring,
            Some((record, _)) if !record.scope.is_empty() => Self::Authorized,
            Some(_) => Self::Authenticated,
            None if has_session => Self::Authenticated,
            None => Self::Anonymous,
        }
    }
}

/// Public profile built from the session store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub external_user_id: String,
    pub federated_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub synthetic: bool,
    pub state: AuthState,
}

/// Introspection of everything the broker holds for one identifier.
///
/// Secrets are never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct DebugSnapshot {
    /// Masked identifier.
    pub user: String,
    pub state: AuthState,
    pub session: Option<SessionRecord>,
    pub session_remaining_secs: Option<u64>,
    pub token: Option<TokenRecord>,
    pub token_remaining_secs: Option<u64>,
    pub has_refresh_token: bool,
    pub upstream_configured: bool,
    pub fallback_enabled: bool,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use douyin_openapi::{ScopeSet, TokenSynthetic};

    fn token(scope: &str) -> TokenRecord {
        TokenRecord {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_in_secs: 7200,
            scope: ScopeSet::parse(scope),
            created_at: Utc::now(),
            raw_upstream_response: None,
            synthetic: TokenSynthetic::default(),
        }
    }

    #[test]
    fn test_resolve_states() {
        let hour = Duration::from_secs(3600);
        assert_eq!(AuthState::resolve(false, None), AuthState::Anonymous);
        assert_eq!(AuthState::resolve(true, None), AuthState::Authenticated);

        let scoped = token("user_info");
        assert_eq!(
            AuthState::resolve(true, Some((&scoped, hour))),
            AuthState::Authorized
        );
        assert_eq!(
            AuthState::resolve(true, Some((&scoped, Duration::from_secs(300)))),
            AuthState::Expiring
        );

        let unscoped = token("");
        assert_eq!(
            AuthState::resolve(true, Some((&unscoped, hour))),
            AuthState::Authenticated
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(AuthState::Expiring.to_string(), "expiring");
    }
}
