//! Startup configuration for the GitHub server.

use std::time::Duration;
use toolgate_mcp::ConfigError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Validated GitHub settings. The token is never printed.
#[derive(Clone)]
pub struct GithubConfig {
    token: String,
    api_url: String,
    timeout: Duration,
}

impl GithubConfig {
    pub fn new(
        token: Option<String>,
        api_url: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ConfigError> {
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::Missing {
                name: "GITHUB_TOKEN",
            })?;

        let api_url = api_url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !(api_url.starts_with("https://") || api_url.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                name: "GITHUB_API_URL",
                reason: format!("'{}' is not an http(s) URL", api_url),
            });
        }

        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "GITHUB_TIMEOUT_SECS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            token,
            api_url,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token() {
        assert!(matches!(
            GithubConfig::new(None, None, 30),
            Err(ConfigError::Missing { name: "GITHUB_TOKEN" })
        ));
        assert!(matches!(
            GithubConfig::new(Some("  ".into()), None, 30),
            Err(ConfigError::Missing { .. })
        ));
    }

    #[test]
    fn test_defaults_and_trailing_slash() {
        let config = GithubConfig::new(Some("ghp_x".into()), None, 30).unwrap();
        assert_eq!(config.api_url(), DEFAULT_API_URL);
        assert_eq!(config.timeout(), Duration::from_secs(30));

        let config =
            GithubConfig::new(Some("ghp_x".into()), Some("https://ghe.local/api/v3/".into()), 5)
                .unwrap();
        assert_eq!(config.api_url(), "https://ghe.local/api/v3");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            GithubConfig::new(Some("t".into()), Some("ftp://x".into()), 30),
            Err(ConfigError::Invalid { name: "GITHUB_API_URL", .. })
        ));
        assert!(matches!(
            GithubConfig::new(Some("t".into()), None, 0),
            Err(ConfigError::Invalid { name: "GITHUB_TIMEOUT_SECS", .. })
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = GithubConfig::new(Some("ghp_secret".into()), None, 30).unwrap();
        assert!(!format!("{:?}", config).contains("ghp_secret"));
    }
}
