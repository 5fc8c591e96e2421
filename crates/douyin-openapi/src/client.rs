//! HTTP client for the open platform.

use std::time::Instant;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::UpstreamConfig;
use crate::error::{ErrorClass, Operation, UpstreamError, classify_payload, classify_status};
use crate::extract::{
    PAGE_EXTRACTORS, SESSION_EXTRACTORS, STATS_EXTRACTORS, TOKEN_EXTRACTORS, TokenFields,
    USER_INFO_EXTRACTORS, first_match,
};
use crate::models::{
    CommentPage, MessagePage, Page, SessionGrant, SessionSynthetic, TokenGrant, TokenSynthetic,
    UserInfo, VideoPage, VideoStats,
};
use crate::scope::ScopeSet;
use crate::utils::{install_rustls_provider, mask};
use crate::{DEFAULT_EXPIRES_IN_SECS, DEFAULT_GRANTED_SCOPE, MAX_PAGE_SIZE};

const ACCESS_TOKEN_PATH: &str = "/oauth/access_token/";
const REFRESH_TOKEN_PATH: &str = "/oauth/refresh_token/";
const VIDEO_LIST_PATH: &str = "/video/list/";
const COMMENT_LIST_PATH: &str = "/comment/list/";
const MESSAGE_LIST_PATH: &str = "/message/list/";
const ITEM_BASE_PATH: &str = "/api/apps/v1/item/get_base/";
const USER_INFO_PATH: &str = "/oauth/userinfo/";

/// Locally generated identifier for a field the upstream did not provide.
fn generated_id(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}

/// Client for the OAuth and data endpoints of the open platform.
///
/// Each operation performs exactly one request. Failures are returned as a
/// classified [`UpstreamError`]; the client itself never substitutes data
/// except for the per-field hybrid defaults documented on each operation.
#[derive(Debug, Clone)]
pub struct OpenApiClient {
    http: Client,
    config: UpstreamConfig,
}

impl OpenApiClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, reqwest::Error> {
        install_rustls_provider();

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    #[inline]
    pub fn has_credentials(&self) -> bool {
        self.config.has_credentials()
    }

    fn credentials(&self, operation: Operation) -> Result<(&str, &str), UpstreamError> {
        match (self.config.app_id.as_deref(), self.config.app_secret.as_deref()) {
            (Some(id), Some(secret)) if self.config.has_credentials() => Ok((id, secret)),
            _ => Err(UpstreamError::transport(
                operation,
                "app credentials are not configured",
            )),
        }
    }

    fn request(
        &self,
        operation: Operation,
        method: reqwest::Method,
        path: &str,
    ) -> Result<RequestBuilder, UpstreamError> {
        let url = self.config.endpoint(path).map_err(|e| {
            UpstreamError::transport(operation, format!("invalid endpoint {path}: {e}"))
        })?;
        Ok(self.http.request(method, url))
    }

    /// Send a request and return the decoded object payload.
    ///
    /// Non-2xx answers, payload error codes and unreadable bodies are
    /// classified here so every operation shares one policy.
    async fn send_json(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<Value, UpstreamError> {
        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(operation, &e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::from_reqwest(operation, &e).with_status(status.as_u16()))?;
        let body: Option<Value> = serde_json::from_slice(&bytes).ok();

        debug!(
            operation = %operation,
            status = status.as_u16(),
            bytes = bytes.len(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Upstream responded"
        );

        if !status.is_success() {
            return Err(classify_status(operation, status.as_u16(), body.as_ref()));
        }

        let body = body.ok_or_else(|| {
            UpstreamError::transport(operation, "response body is not valid JSON")
                .with_status(status.as_u16())
        })?;

        if !body.is_object() {
            warn!(operation = %operation, "Upstream payload is not a JSON object");
            return Err(UpstreamError::new(ErrorClass::Unknown, operation)
                .with_status(status.as_u16())
                .with_message("response payload is not a JSON object"));
        }

        if let Some(err) = classify_payload(operation, &body) {
            return Err(err.with_status(status.as_u16()));
        }

        Ok(body)
    }

    /// Exchange a login code for the user's identity and session key.
    ///
    /// When no known layout matches, the identity and the session key are
    /// generated and flagged synthetic.
    #[instrument(skip_all)]
    pub async fn exchange_login_code(&self, code: &str) -> Result<SessionGrant, UpstreamError> {
        let operation = Operation::ExchangeLoginCode;
        let (client_key, client_secret) = self.credentials(operation)?;
        let request = self
            .request(operation, reqwest::Method::POST, ACCESS_TOKEN_PATH)?
            .json(&json!({
                "client_key": client_key,
                "client_secret": client_secret,
                "code": code,
                "grant_type": "authorization_code",
            }));
        let body = self.send_json(operation, request).await?;

        let grant = match first_match(&body, SESSION_EXTRACTORS) {
            Some((layout, fields)) => {
                debug!(layout, open_id = %mask(&fields.open_id), "Session layout matched");
                let secret_missing = fields.session_key.is_none();
                SessionGrant {
                    open_id: fields.open_id,
                    union_id: fields.union_id,
                    session_key: fields
                        .session_key
                        .unwrap_or_else(|| generated_id("api_session_")),
                    synthetic: SessionSynthetic {
                        identity: false,
                        secret: secret_missing,
                    },
                    raw: Some(body),
                }
            }
            None => {
                warn!("No session layout matched, generating identity");
                SessionGrant {
                    open_id: generated_id("api_user_"),
                    union_id: None,
                    session_key: generated_id("api_session_"),
                    synthetic: SessionSynthetic::all(),
                    raw: Some(body),
                }
            }
        };
        Ok(grant)
    }

    /// Exchange an authorization ticket for an access token.
    ///
    /// Missing `expires_in` and `scope` fall back to the platform defaults
    /// and are flagged synthetic.
    #[instrument(skip_all)]
    pub async fn exchange_auth_ticket(&self, ticket: &str) -> Result<TokenGrant, UpstreamError> {
        let operation = Operation::ExchangeAuthTicket;
        let (client_key, client_secret) = self.credentials(operation)?;
        let request = self
            .request(operation, reqwest::Method::POST, ACCESS_TOKEN_PATH)?
            .json(&json!({
                "client_key": client_key,
                "client_secret": client_secret,
                "code": ticket,
                "grant_type": "authorization_code",
            }));
        let body = self.send_json(operation, request).await?;

        Ok(token_grant(body, Some(ScopeSet::parse(DEFAULT_GRANTED_SCOPE))))
    }

    /// Renew an access token. A scope the upstream does not echo is left empty.
    #[instrument(skip_all)]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, UpstreamError> {
        let operation = Operation::RefreshToken;
        let (client_key, client_secret) = self.credentials(operation)?;
        let request = self
            .request(operation, reqwest::Method::POST, REFRESH_TOKEN_PATH)?
            .json(&json!({
                "client_key": client_key,
                "client_secret": client_secret,
                "refresh_token": refresh_token,
                "grant_type": "refresh_token",
            }));
        let body = self.send_json(operation, request).await?;

        Ok(token_grant(body, None))
    }

    /// List the user's videos. `page_size` is clamped to `1..=20`.
    #[instrument(skip_all, fields(open_id = %mask(open_id), cursor = cursor, page_size = page_size))]
    pub async fn list_user_videos(
        &self,
        access_token: &str,
        open_id: &str,
        cursor: u64,
        page_size: u32,
    ) -> Result<VideoPage, UpstreamError> {
        let operation = Operation::ListUserVideos;
        let count = page_size.clamp(1, MAX_PAGE_SIZE);
        let request = self
            .request(operation, reqwest::Method::POST, VIDEO_LIST_PATH)?
            .json(&json!({
                "open_id": open_id,
                "cursor": cursor,
                "count": count,
                "access_token": access_token,
            }));
        let body = self.send_json(operation, request).await?;

        Ok(page_from(&body, cursor))
    }

    /// List comments on the user's videos. `page_size` is clamped to `1..=20`.
    #[instrument(skip_all, fields(open_id = %mask(open_id), cursor = cursor, page_size = page_size))]
    pub async fn list_user_comments(
        &self,
        access_token: &str,
        open_id: &str,
        cursor: u64,
        page_size: u32,
    ) -> Result<CommentPage, UpstreamError> {
        let operation = Operation::ListUserComments;
        let request = self.list_request(
            operation,
            COMMENT_LIST_PATH,
            access_token,
            open_id,
            cursor,
            page_size,
        )?;
        let body = self.send_json(operation, request).await?;

        Ok(page_from(&body, cursor))
    }

    /// List the user's private messages. `page_size` is clamped to `1..=20`.
    #[instrument(skip_all, fields(open_id = %mask(open_id), cursor = cursor, page_size = page_size))]
    pub async fn list_user_messages(
        &self,
        access_token: &str,
        open_id: &str,
        cursor: u64,
        page_size: u32,
    ) -> Result<MessagePage, UpstreamError> {
        let operation = Operation::ListUserMessages;
        let request = self.list_request(
            operation,
            MESSAGE_LIST_PATH,
            access_token,
            open_id,
            cursor,
            page_size,
        )?;
        let body = self.send_json(operation, request).await?;

        Ok(page_from(&body, cursor))
    }

    /// GET request of a query-paged list endpoint.
    fn list_request(
        &self,
        operation: Operation,
        path: &str,
        access_token: &str,
        open_id: &str,
        cursor: u64,
        page_size: u32,
    ) -> Result<RequestBuilder, UpstreamError> {
        let count = page_size.clamp(1, MAX_PAGE_SIZE);
        Ok(self
            .request(operation, reqwest::Method::GET, path)?
            .query(&[("access_token", access_token), ("open_id", open_id)])
            .query(&[("cursor", cursor), ("count", u64::from(count))]))
    }

    /// Fetch the aggregate statistics of one item.
    #[instrument(skip_all, fields(open_id = %mask(open_id), item_id = %item_id))]
    pub async fn get_video_stats(
        &self,
        access_token: &str,
        open_id: &str,
        item_id: &str,
    ) -> Result<VideoStats, UpstreamError> {
        let operation = Operation::GetVideoStats;
        // The endpoint expects an already encoded item id.
        let encoded_item_id = urlencoding::encode(item_id);
        let request = self
            .request(operation, reqwest::Method::GET, ITEM_BASE_PATH)?
            .header("access-token", access_token)
            .query(&[("open_id", open_id), ("item_id", &*encoded_item_id)]);
        let body = self.send_json(operation, request).await?;

        let stats = match first_match(&body, STATS_EXTRACTORS) {
            Some((layout, fields)) => {
                debug!(layout, "Stats layout matched");
                VideoStats {
                    likes: fields.likes,
                    comments: fields.comments,
                    shares: fields.shares,
                    plays: fields.plays,
                    avg_play_duration_secs: fields.avg_play_duration_secs,
                    synthetic: false,
                }
            }
            None => {
                warn!("No stats layout matched, reporting zeroed statistics");
                VideoStats {
                    likes: 0,
                    comments: 0,
                    shares: 0,
                    plays: 0,
                    avg_play_duration_secs: 0.0,
                    synthetic: true,
                }
            }
        };
        Ok(stats)
    }

    /// Fetch the public profile of the authorizing user.
    #[instrument(skip_all, fields(open_id = %mask(open_id)))]
    pub async fn get_user_info(
        &self,
        access_token: &str,
        open_id: &str,
    ) -> Result<UserInfo, UpstreamError> {
        let operation = Operation::GetUserInfo;
        let request = self
            .request(operation, reqwest::Method::POST, USER_INFO_PATH)?
            .json(&json!({
                "open_id": open_id,
                "access_token": access_token,
            }));
        let body = self.send_json(operation, request).await?;

        let info = match first_match(&body, USER_INFO_EXTRACTORS) {
            Some((layout, fields)) => {
                debug!(layout, "User info layout matched");
                UserInfo {
                    open_id: fields.open_id.unwrap_or_else(|| open_id.to_string()),
                    nickname: fields.nickname.unwrap_or_default(),
                    avatar: fields.avatar.unwrap_or_default(),
                    gender: fields.gender,
                    country: fields.country.unwrap_or_default(),
                    province: fields.province.unwrap_or_default(),
                    city: fields.city.unwrap_or_default(),
                    language: fields.language.unwrap_or_default(),
                    synthetic: false,
                }
            }
            None => {
                warn!("No user info layout matched, returning placeholder profile");
                UserInfo {
                    open_id: open_id.to_string(),
                    nickname: String::new(),
                    avatar: String::new(),
                    gender: 0,
                    country: String::new(),
                    province: String::new(),
                    city: String::new(),
                    language: String::new(),
                    synthetic: true,
                }
            }
        };
        Ok(info)
    }
}

/// Read a page from a list payload. Entries that do not decode are skipped.
///
/// A payload without a list yields an empty page at the same cursor.
fn page_from<T: DeserializeOwned>(body: &Value, cursor: u64) -> Page<T> {
    match first_match(body, PAGE_EXTRACTORS) {
        Some((layout, fields)) => {
            let items: Vec<T> = fields
                .items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect();
            debug!(layout, items = items.len(), "Page layout matched");
            Page {
                cursor: fields
                    .cursor
                    .unwrap_or_else(|| cursor.saturating_add(items.len() as u64)),
                has_more: fields.has_more.unwrap_or(false),
                items,
                synthetic: false,
            }
        }
        None => {
            debug!("List payload carries no list");
            Page {
                items: Vec::new(),
                cursor,
                has_more: false,
                synthetic: false,
            }
        }
    }
}

/// Build a token grant from a payload, generating what is missing.
///
/// `default_scope` is applied when the payload carries no scope; `None` leaves
/// the scope empty for the caller to fill in.
fn token_grant(body: Value, default_scope: Option<ScopeSet>) -> TokenGrant {
    let matched = first_match(&body, TOKEN_EXTRACTORS);
    let (fields, credentials_generated) = match matched {
        Some((layout, fields)) => {
            debug!(layout, "Token layout matched");
            (fields, false)
        }
        None => {
            warn!("No token layout matched, generating credentials");
            (
                TokenFields {
                    access_token: generated_id("api_token_"),
                    refresh_token: None,
                    expires_in: None,
                    scope: None,
                    open_id: None,
                },
                true,
            )
        }
    };

    let expiry_defaulted = fields.expires_in.is_none();
    let (scope, scope_defaulted) = match (fields.scope, default_scope) {
        (Some(scope), _) => (scope, false),
        (None, Some(default)) => (default, true),
        (None, None) => (ScopeSet::new(), false),
    };

    let refresh_token = match fields.refresh_token {
        Some(token) => token,
        None if credentials_generated => generated_id("api_refresh_"),
        None => String::new(),
    };

    TokenGrant {
        access_token: fields.access_token,
        refresh_token,
        expires_in: fields.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
        scope,
        open_id: fields.open_id,
        synthetic: TokenSynthetic {
            credentials: credentials_generated,
            expiry: expiry_defaulted,
            scope: scope_defaulted,
        },
        raw: Some(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_grant_defaults_and_flags() {
        let body = json!({ "access_token": "at", "refresh_token": "rt" });
        let grant = token_grant(body, Some(ScopeSet::parse(DEFAULT_GRANTED_SCOPE)));
        assert_eq!(grant.access_token, "at");
        assert_eq!(grant.expires_in, DEFAULT_EXPIRES_IN_SECS);
        assert!(grant.scope.contains("ma.user.data"));
        assert!(!grant.synthetic.credentials);
        assert!(grant.synthetic.expiry);
        assert!(grant.synthetic.scope);
    }

    #[test]
    fn test_token_grant_hybrid_generates_credentials() {
        let grant = token_grant(json!({ "message": "ok" }), None);
        assert!(grant.access_token.starts_with("api_token_"));
        assert!(grant.refresh_token.starts_with("api_refresh_"));
        assert!(grant.synthetic.credentials);
        assert!(grant.scope.is_empty());
        assert!(!grant.synthetic.scope);
    }

    #[test]
    fn test_token_grant_keeps_upstream_scope() {
        let body = json!({ "data": { "access_token": "at", "expires_in": 600, "scope": "user_info" } });
        let grant = token_grant(body, Some(ScopeSet::parse(DEFAULT_GRANTED_SCOPE)));
        assert_eq!(grant.scope.to_vec(), vec!["user_info"]);
        assert_eq!(grant.expires_in, 600);
        assert!(!grant.synthetic.any());
        assert!(grant.refresh_token.is_empty());
    }

    #[test]
    fn test_page_cursor_saturates_without_upstream_cursor() {
        let body = json!({ "data": { "list": [{ "item_id": "v1" }] } });
        let page: VideoPage = page_from(&body, u64::MAX);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.cursor, u64::MAX);
        assert!(!page.has_more);

        let page: VideoPage = page_from(&body, 4);
        assert_eq!(page.cursor, 5);
    }

    #[test]
    fn test_comment_page_skips_undecodable_entries() {
        let body = json!({
            "data": [{ "comment_id": "c1", "text": "hi", "top": true }, "garbage"],
            "cursor": 7,
            "has_more": true
        });
        let page: CommentPage = page_from(&body, 0);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].comment_id, "c1");
        assert!(page.items[0].top);
        assert_eq!(page.cursor, 7);
        assert!(page.has_more);
    }

    #[test]
    fn test_page_without_list_keeps_cursor() {
        let page: MessagePage = page_from(&json!({ "extra": {} }), 12);
        assert!(page.items.is_empty());
        assert_eq!(page.cursor, 12);
        assert!(!page.synthetic);
    }
}
