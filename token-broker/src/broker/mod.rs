//! Broker facade.
//!
//! The only entry point of the HTTP layer. Orchestrates the upstream client,
//! the session/token stores, the scope gate and the fallback generator:
//!
//! - authorization failures are returned verbatim and never replaced;
//! - transport and configuration failures become synthetic results when
//!   fallback is enabled;
//! - scope denials are policy outcomes and are never retried.

mod inflight;
mod state;

pub use state::{AuthState, DebugSnapshot, EXPIRING_WINDOW, UserProfile};

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use douyin_openapi::{
    CommentPage, DEFAULT_GRANTED_SCOPE, MAX_PAGE_SIZE, MessagePage, OpenApiClient, Operation,
    ScopeSet, UpstreamError, UserInfo, VideoPage, VideoStats, mask,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::cache::{CacheStats, Clock, SystemClock};
use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::fallback::FallbackGenerator;
use crate::scope::{self, ScopeRequirement};
use crate::store::{RecordCache, SessionRecord, SessionStore, TokenRecord, TokenStore};

use inflight::SingleFlight;

type RefreshResult = Result<TokenRecord, BrokerError>;

fn require(value: &str, what: &str) -> Result<(), BrokerError> {
    if value.trim().is_empty() {
        return Err(BrokerError::InvalidRequest(format!("{what} is required")));
    }
    Ok(())
}

pub struct Broker {
    client: OpenApiClient,
    cache: Arc<RecordCache>,
    sessions: SessionStore,
    tokens: TokenStore,
    fallback: FallbackGenerator,
    config: BrokerConfig,
    refreshes: SingleFlight<RefreshResult>,
}

impl Broker {
    /// Assemble a broker from its collaborators. Both stores live in `cache`.
    pub fn new(
        client: OpenApiClient,
        cache: Arc<RecordCache>,
        fallback: FallbackGenerator,
        config: BrokerConfig,
    ) -> Self {
        Self {
            client,
            sessions: SessionStore::new(cache.clone()),
            tokens: TokenStore::new(cache.clone()),
            cache,
            fallback,
            config,
            refreshes: SingleFlight::new(),
        }
    }

    pub fn from_config(config: BrokerConfig) -> Result<Self, BrokerError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a broker whose stores expire entries according to `clock`.
    pub fn with_clock(config: BrokerConfig, clock: Arc<dyn Clock>) -> Result<Self, BrokerError> {
        let client = OpenApiClient::new(config.upstream()).map_err(|e| {
            BrokerError::Configuration(format!("failed to build HTTP client: {e}"))
        })?;
        let cache = Arc::new(RecordCache::with_clock(clock));
        Ok(Self::new(client, cache, FallbackGenerator::new(), config))
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn client(&self) -> &OpenApiClient {
        &self.client
    }

    // ========== Upstream attempt policy ==========

    /// Run one upstream call under the fallback policy.
    ///
    /// `Ok(None)` means the caller must substitute synthetic data. Missing
    /// credentials are detected before `call` is polled, so no request is sent.
    async fn attempt<T, Fut>(
        &self,
        operation: Operation,
        user: &str,
        call: Fut,
    ) -> Result<Option<T>, BrokerError>
    where
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let started = Instant::now();
        let user = mask(user);
        info!(phase = "attempted", operation = %operation, user = %user, "Upstream call attempted");

        if !self.client.has_credentials() {
            let cause =
                BrokerError::Configuration("upstream app credentials are not configured".into());
            return self.degrade(operation, &user, started, cause);
        }

        match call.await {
            Ok(value) => {
                info!(
                    phase = "success",
                    operation = %operation,
                    user = %user,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Upstream call succeeded"
                );
                Ok(Some(value))
            }
            Err(err) => {
                warn!(
                    phase = "classified_error",
                    operation = %operation,
                    user = %user,
                    class = %err.class,
                    http_status = ?err.http_status,
                    upstream_code = ?err.upstream_code,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Upstream call failed"
                );
                if err.is_authorization() {
                    return Err(err.into());
                }
                self.degrade(operation, &user, started, err.into())
            }
        }
    }

    fn degrade<T>(
        &self,
        operation: Operation,
        user: &str,
        started: Instant,
        cause: BrokerError,
    ) -> Result<Option<T>, BrokerError> {
        if !self.config.fallback_enabled {
            return Err(cause);
        }
        warn!(
            phase = "fallback_invoked",
            operation = %operation,
            user = %user,
            cause = %cause,
            latency_ms = started.elapsed().as_millis() as u64,
            "Serving synthetic data"
        );
        Ok(None)
    }

    /// A synthetic token is never sent upstream.
    fn synthetic_token_fallback(&self, operation: Operation, id: &str) -> Result<(), BrokerError> {
        if !self.config.fallback_enabled {
            return Err(BrokerError::unauthenticated(
                "stored access token is synthetic and fallback is disabled; authorize again",
            ));
        }
        info!(
            phase = "fallback_invoked",
            operation = %operation,
            user = %mask(id),
            cause = "synthetic access token",
            "Serving synthetic data"
        );
        Ok(())
    }

    // ========== OAuth legs ==========

    /// Exchange a login code for a session and store it under the returned identifier.
    #[instrument(skip_all)]
    pub async fn exchange_login_code(&self, code: &str) -> Result<SessionRecord, BrokerError> {
        require(code, "login code")?;

        let grant = match self
            .attempt(
                Operation::ExchangeLoginCode,
                "anonymous",
                self.client.exchange_login_code(code),
            )
            .await?
        {
            Some(grant) => grant,
            None => self.fallback.session(),
        };

        let record = SessionRecord::from_grant(grant);
        self.sessions.put(
            &record.external_user_id,
            record.clone(),
            self.config.session_ttl(),
        );
        info!(
            user = %mask(&record.external_user_id),
            synthetic = record.is_synthetic(),
            "Session stored"
        );
        Ok(record)
    }

    /// Exchange an authorization ticket for a token. Requires a session for `id`.
    ///
    /// The token is in the store when this returns.
    #[instrument(skip_all, fields(user = %mask(id)))]
    pub async fn exchange_auth_ticket(
        &self,
        ticket: &str,
        id: &str,
    ) -> Result<TokenRecord, BrokerError> {
        require(ticket, "ticket")?;
        require(id, "external user id")?;
        if self.sessions.get(id).is_none() {
            return Err(BrokerError::unauthenticated(
                "no session for this user; exchange a login code first",
            ));
        }

        let grant = match self
            .attempt(
                Operation::ExchangeAuthTicket,
                id,
                self.client.exchange_auth_ticket(ticket),
            )
            .await?
        {
            Some(grant) => grant,
            None => self.fallback.token(),
        };

        let record = TokenRecord::from_grant(grant);
        self.tokens.put_token(id, record.clone());
        info!(
            scope = %record.scope,
            expires_in = record.expires_in_secs,
            synthetic = record.has_synthetic_credentials(),
            "Token stored"
        );
        Ok(record)
    }

    /// Renew the token of `id`. Concurrent refreshes for one id share one upstream call.
    #[instrument(skip_all, fields(user = %mask(id)))]
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        id: &str,
    ) -> Result<TokenRecord, BrokerError> {
        require(refresh_token, "refresh token")?;
        require(id, "external user id")?;
        if self.sessions.get(id).is_none() && self.tokens.get(id).is_none() {
            return Err(BrokerError::unauthenticated(
                "no session or token for this user",
            ));
        }

        self.refreshes
            .run(id, || self.refresh_now(refresh_token, id))
            .await
    }

    async fn refresh_now(&self, refresh_token: &str, id: &str) -> RefreshResult {
        let previous = self.tokens.get(id);
        let previous_is_synthetic = previous
            .as_ref()
            .is_some_and(|p| p.has_synthetic_credentials() && p.refresh_token == refresh_token);

        let grant = if previous_is_synthetic {
            self.synthetic_token_fallback(Operation::RefreshToken, id)?;
            self.fallback.refreshed_token()
        } else {
            match self
                .attempt(
                    Operation::RefreshToken,
                    id,
                    self.client.refresh_token(refresh_token),
                )
                .await?
            {
                Some(grant) => grant,
                None => self.fallback.refreshed_token(),
            }
        };

        let mut record = TokenRecord::from_grant(grant);
        if record.scope.is_empty() {
            match previous.filter(|p| !p.scope.is_empty()) {
                Some(previous) => {
                    record.scope = previous.scope;
                    record.synthetic.scope = previous.synthetic.scope;
                }
                None => {
                    record.scope = ScopeSet::parse(DEFAULT_GRANTED_SCOPE);
                    record.synthetic.scope = true;
                }
            }
        }

        self.tokens.put_token(id, record.clone());
        info!(
            scope = %record.scope,
            expires_in = record.expires_in_secs,
            synthetic = record.has_synthetic_credentials(),
            "Token refreshed"
        );
        Ok(record)
    }

    // ========== Data operations ==========

    /// Load the token of `id`, refresh it if it is about to leave the store,
    /// then check it against `requirement`.
    async fn authorized_token(
        &self,
        id: &str,
        requirement: &ScopeRequirement,
    ) -> Result<TokenRecord, BrokerError> {
        require(id, "external user id")?;
        let mut token = self.tokens.get(id).ok_or_else(|| {
            BrokerError::unauthenticated("no access token; complete the ticket exchange first")
        })?;

        if self.is_expiring(id) && !token.refresh_token.is_empty() {
            info!(user = %mask(id), "Token expiring, refreshing proactively");
            let refresh_token = token.refresh_token.clone();
            match self.refresh_token(&refresh_token, id).await {
                Ok(refreshed) => token = refreshed,
                Err(e) => warn!(
                    user = %mask(id),
                    error = %e,
                    "Proactive refresh failed, using current token"
                ),
            }
        }

        scope::check(&token.scope, requirement).map_err(BrokerError::ScopeDenied)?;
        Ok(token)
    }

    fn is_expiring(&self, id: &str) -> bool {
        self.tokens
            .remaining(id)
            .is_some_and(|remaining| remaining <= EXPIRING_WINDOW)
    }

    /// List the user's videos. `page_size` is clamped to `1..=20`.
    #[instrument(skip_all, fields(user = %mask(id), cursor = cursor, page_size = page_size))]
    pub async fn list_user_videos(
        &self,
        id: &str,
        cursor: u64,
        page_size: u32,
    ) -> Result<VideoPage, BrokerError> {
        let operation = Operation::ListUserVideos;
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let token = self
            .authorized_token(id, &ScopeRequirement::video_list())
            .await?;

        if token.has_synthetic_credentials() {
            self.synthetic_token_fallback(operation, id)?;
            return Ok(self.fallback.video_page(cursor, page_size));
        }

        let call = self
            .client
            .list_user_videos(&token.access_token, id, cursor, page_size);
        match self.attempt(operation, id, call).await? {
            Some(page) => Ok(page),
            None => Ok(self.fallback.video_page(cursor, page_size)),
        }
    }

    /// Comments left on the user's videos, newest first.
    #[instrument(skip_all, fields(user = %mask(id), cursor = cursor, page_size = page_size))]
    pub async fn list_user_comments(
        &self,
        id: &str,
        cursor: u64,
        page_size: u32,
    ) -> Result<CommentPage, BrokerError> {
        let operation = Operation::ListUserComments;
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let token = self
            .authorized_token(id, &ScopeRequirement::comment_list())
            .await?;

        if token.has_synthetic_credentials() {
            self.synthetic_token_fallback(operation, id)?;
            return Ok(self.fallback.comment_page(cursor, page_size));
        }

        let call = self
            .client
            .list_user_comments(&token.access_token, id, cursor, page_size);
        match self.attempt(operation, id, call).await? {
            Some(page) => Ok(page),
            None => Ok(self.fallback.comment_page(cursor, page_size)),
        }
    }

    #[instrument(skip_all, fields(user = %mask(id), cursor = cursor, page_size = page_size))]
    pub async fn list_user_messages(
        &self,
        id: &str,
        cursor: u64,
        page_size: u32,
    ) -> Result<MessagePage, BrokerError> {
        let operation = Operation::ListUserMessages;
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let token = self
            .authorized_token(id, &ScopeRequirement::message_list())
            .await?;

        if token.has_synthetic_credentials() {
            self.synthetic_token_fallback(operation, id)?;
            return Ok(self.fallback.message_page(id, cursor, page_size));
        }

        let call = self
            .client
            .list_user_messages(&token.access_token, id, cursor, page_size);
        match self.attempt(operation, id, call).await? {
            Some(page) => Ok(page),
            None => Ok(self.fallback.message_page(id, cursor, page_size)),
        }
    }

    /// Aggregate statistics of one item.
    #[instrument(skip_all, fields(user = %mask(id), item_id = %item_id))]
    pub async fn get_video_stats(&self, id: &str, item_id: &str) -> Result<VideoStats, BrokerError> {
        let operation = Operation::GetVideoStats;
        require(item_id, "item id")?;
        let token = self
            .authorized_token(id, &ScopeRequirement::video_stats())
            .await?;

        if token.has_synthetic_credentials() {
            self.synthetic_token_fallback(operation, id)?;
            return Ok(self.fallback.video_stats(item_id));
        }

        let call = self
            .client
            .get_video_stats(&token.access_token, id, item_id);
        match self.attempt(operation, id, call).await? {
            Some(stats) => Ok(stats),
            None => Ok(self.fallback.video_stats(item_id)),
        }
    }

    #[instrument(skip_all, fields(user = %mask(id)))]
    pub async fn get_user_info(&self, id: &str) -> Result<UserInfo, BrokerError> {
        let operation = Operation::GetUserInfo;
        let token = self
            .authorized_token(id, &ScopeRequirement::user_info())
            .await?;

        if token.has_synthetic_credentials() {
            self.synthetic_token_fallback(operation, id)?;
            return Ok(self.fallback.user_info(id));
        }

        let call = self.client.get_user_info(&token.access_token, id);
        match self.attempt(operation, id, call).await? {
            Some(info) => Ok(info),
            None => Ok(self.fallback.user_info(id)),
        }
    }

    // ========== Introspection ==========

    /// Profile of a user with a live session.
    pub fn profile(&self, id: &str) -> Result<UserProfile, BrokerError> {
        let session = self.sessions.get(id).ok_or_else(|| BrokerError::NotFound {
            what: "session".to_string(),
        })?;
        Ok(UserProfile {
            synthetic: session.is_synthetic(),
            external_user_id: session.external_user_id,
            federated_id: session.federated_id,
            created_at: session.created_at,
            state: self.status(id),
        })
    }

    pub fn status(&self, id: &str) -> AuthState {
        let token = self.tokens.get(id);
        let remaining = self.tokens.remaining(id);
        let token = token.as_ref().zip(remaining);
        AuthState::resolve(self.sessions.get(id).is_some(), token)
    }

    pub fn debug_snapshot(&self, id: &str) -> DebugSnapshot {
        let session = self.sessions.get(id);
        let token = self.tokens.get(id);
        let token_remaining = self.tokens.remaining(id);
        DebugSnapshot {
            user: mask(id),
            state: AuthState::resolve(session.is_some(), token.as_ref().zip(token_remaining)),
            session_remaining_secs: self.sessions.remaining(id).map(|d| d.as_secs()),
            session,
            token_remaining_secs: token_remaining.map(|d| d.as_secs()),
            has_refresh_token: token.as_ref().is_some_and(|t| !t.refresh_token.is_empty()),
            token,
            upstream_configured: self.client.has_credentials(),
            fallback_enabled: self.config.fallback_enabled,
            cache: self.cache.stats(),
        }
    }

    /// Forget everything held for `id`. Returns whether anything was removed.
    pub fn logout(&self, id: &str) -> bool {
        let had_session = self.sessions.remove(id);
        let had_token = self.tokens.remove(id);
        info!(user = %mask(id), had_session, had_token, "Logged out");
        had_session || had_token
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Start the background expiry sweep, unless disabled by configuration.
    pub fn spawn_cache_sweeper(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        self.config
            .cache_sweep_interval()
            .map(|interval| self.cache.spawn_sweeper(interval, cancel))
    }
}
