use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Main configuration for the Saucier service.
///
/// Built from environment variables (prefixed `SAUCIER_`) via
/// [`Config::from_env`], or programmatically via [`ConfigBuilder`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub entitlements: EntitlementConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

/// Connection settings for the subscription provider's REST API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    /// Bearer key for `GET /v1/subscribers/{uid}`. Absence makes pull
    /// reconciliation a configuration failure; webhooks still work.
    #[serde(skip)]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry knobs for outbound provider calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempt budget, including the first try.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// Shared secret for HMAC-SHA256 webhook signatures.
    #[serde(skip)]
    pub secret: Option<SecretString>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntitlementConfig {
    /// Days of access granted past expiry to absorb renewal payment delays.
    #[serde(default = "default_grace_days")]
    pub grace_days: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HS256 secret for verifying caller bearer tokens.
    #[serde(skip)]
    pub jwt_secret: Option<SecretString>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_key: None,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            grace_days: default_grace_days(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_provider_base_url() -> String {
    "https://api.revenuecat.com".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_grace_days() -> u32 {
    3
}

impl Config {
    /// Load configuration from `SAUCIER_`-prefixed environment variables.
    ///
    /// Unset variables fall back to defaults; unparseable numeric values are
    /// logged and defaulted rather than aborting startup.
    #[must_use]
    pub fn from_env() -> Self {
        ConfigBuilder::new().from_env().build()
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay values from `SAUCIER_`-prefixed environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if let Some(host) = env_var("HOST") {
            self.config.server.host = host;
        }
        if let Some(port) = env_parsed("PORT") {
            self.config.server.port = port;
        }
        if let Some(level) = env_var("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = env_parsed("LOG_JSON") {
            self.config.logging.json = json;
        }
        if let Some(url) = env_var("PROVIDER_BASE_URL") {
            self.config.provider.base_url = url;
        }
        if let Some(key) = env_var("PROVIDER_API_KEY") {
            self.config.provider.api_key = Some(SecretString::new(key));
        }
        if let Some(attempts) = env_parsed("PROVIDER_MAX_ATTEMPTS") {
            self.config.provider.retry.max_attempts = attempts;
        }
        if let Some(delay) = env_parsed("PROVIDER_BASE_DELAY_MS") {
            self.config.provider.retry.base_delay_ms = delay;
        }
        if let Some(delay) = env_parsed("PROVIDER_MAX_DELAY_MS") {
            self.config.provider.retry.max_delay_ms = delay;
        }
        if let Some(timeout) = env_parsed("PROVIDER_TIMEOUT_SECONDS") {
            self.config.provider.retry.timeout_seconds = timeout;
        }
        if let Some(secret) = env_var("WEBHOOK_SECRET") {
            self.config.webhook.secret = Some(SecretString::new(secret));
        }
        if let Some(days) = env_parsed("GRACE_DAYS") {
            self.config.entitlements.grace_days = days;
        }
        if let Some(secret) = env_var("JWT_SECRET") {
            self.config.auth.jwt_secret = Some(SecretString::new(secret));
        }
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    #[must_use]
    pub fn with_provider_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.provider.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_provider_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.provider.api_key = Some(SecretString::new(key.into()));
        self
    }

    #[must_use]
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.webhook.secret = Some(SecretString::new(secret.into()));
        self
    }

    #[must_use]
    pub fn with_grace_days(mut self, days: u32) -> Self {
        self.config.entitlements.grace_days = days;
        self
    }

    #[must_use]
    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.jwt_secret = Some(SecretString::new(secret.into()));
        self
    }

    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(format!("SAUCIER_{key}"))
        .ok()
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env_var(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(
                target: "saucier::config",
                key = %format!("SAUCIER_{key}"),
                value = %raw,
                "Ignoring unparseable environment variable"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.entitlements.grace_days, 3);
        assert_eq!(config.provider.retry.max_attempts, 3);
        assert!(config.provider.api_key.is_none());
        assert!(config.webhook.secret.is_none());
    }

    #[test]
    fn builder_overrides() {
        let config = ConfigBuilder::new()
            .with_port(9000)
            .with_grace_days(7)
            .with_provider_api_key("sk_test_1234567890")
            .build();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.entitlements.grace_days, 7);
        assert!(config.provider.api_key.is_some());
    }
}
