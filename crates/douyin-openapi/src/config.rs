use std::time::Duration;

use url::Url;

/// Production host of the open platform.
pub const DEFAULT_BASE_URL: &str = "https://open.douyin.com";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_USER_AGENT: &str = concat!("douyin-openapi/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`crate::OpenApiClient`].
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Absolute base URL, e.g. `https://open.douyin.com`.
    pub base_url: String,
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_id: None,
            app_secret: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl UpstreamConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(
        mut self,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        self.app_id = Some(app_id.into());
        self.app_secret = Some(app_secret.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Both the app id and the app secret are configured and non-blank.
    pub fn has_credentials(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.app_id) && present(&self.app_secret)
    }

    /// Resolve an endpoint path against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)?.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_credentials_requires_both() {
        let config = UpstreamConfig::default();
        assert!(!config.has_credentials());

        let config = UpstreamConfig::default().with_credentials("app", " ");
        assert!(!config.has_credentials());

        let config = UpstreamConfig::default().with_credentials("app", "secret");
        assert!(config.has_credentials());
    }

    #[test]
    fn test_endpoint_joins_absolute_path() {
        let config = UpstreamConfig::new("http://127.0.0.1:8080");
        assert_eq!(
            config.endpoint("/oauth/access_token/").unwrap().as_str(),
            "http://127.0.0.1:8080/oauth/access_token/"
        );
        assert!(UpstreamConfig::new("not a url").endpoint("/x").is_err());
    }
}
