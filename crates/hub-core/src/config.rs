//! Client configuration.
//!
//! The two origins (REST API and realtime service) are supplied by the
//! environment; everything else has a default.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{BackoffPolicy, CoreError, CoreResult};

/// Environment variable naming the REST API origin.
pub const API_URL_VAR: &str = "HUB_API_URL";

/// Environment variable naming the realtime service origin.
pub const REALTIME_URL_VAR: &str = "HUB_REALTIME_URL";

/// Realtime connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Handshake timeout before an attempt counts as a connect error.
    pub connect_timeout_ms: u64,
    /// Keepalive ping interval. Zero disables pings.
    pub ping_interval_ms: u64,
    /// Reconnect with the new credential whenever it is refreshed.
    pub reconnect_on_refresh: bool,
    /// Reconnection budget and delays.
    pub backoff: BackoffPolicy,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            ping_interval_ms: 25_000,
            reconnect_on_refresh: false,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RealtimeConfig {
    /// Create a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// Set the keepalive ping interval.
    #[must_use]
    pub const fn with_ping_interval_ms(mut self, ms: u64) -> Self {
        self.ping_interval_ms = ms;
        self
    }

    /// Force a reconnect on every credential refresh.
    #[must_use]
    pub const fn with_reconnect_on_refresh(mut self, enabled: bool) -> Self {
        self.reconnect_on_refresh = enabled;
        self
    }

    /// Set the backoff policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Handshake timeout as a Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Ping interval as a Duration (or None if disabled).
    #[must_use]
    pub const fn ping_interval(&self) -> Option<Duration> {
        if self.ping_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.ping_interval_ms))
        }
    }
}

/// Configuration for a client session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// REST API origin, e.g. `https://api.example.com/api`.
    pub api_base_url: Url,

    /// Realtime service origin, e.g. `wss://rt.example.com/socket`.
    pub realtime_url: Url,

    /// Per-request transport timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Notification history page size.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Interval of the unread-count cross-check in milliseconds.
    #[serde(default = "default_unread_poll_interval_ms")]
    pub unread_poll_interval_ms: u64,

    /// Realtime connection settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

const fn default_page_size() -> u32 {
    20
}

const fn default_unread_poll_interval_ms() -> u64 {
    60_000
}

impl ClientConfig {
    /// Create a configuration from the two origins.
    #[must_use]
    pub fn new(api_base_url: Url, realtime_url: Url) -> Self {
        Self {
            api_base_url,
            realtime_url,
            request_timeout_ms: default_request_timeout_ms(),
            page_size: default_page_size(),
            unread_poll_interval_ms: default_unread_poll_interval_ms(),
            realtime: RealtimeConfig::default(),
        }
    }

    /// Read the origins from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingInput`] when a variable is unset and
    /// [`CoreError::UrlError`] when it does not parse.
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the origins through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Same as [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api = lookup(API_URL_VAR).ok_or(CoreError::MissingInput(API_URL_VAR))?;
        let realtime = lookup(REALTIME_URL_VAR).ok_or(CoreError::MissingInput(REALTIME_URL_VAR))?;
        Ok(Self::new(Url::parse(&api)?, Url::parse(&realtime)?))
    }

    /// Set the page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    /// Set the unread-count polling interval.
    #[must_use]
    pub const fn with_unread_poll_interval_ms(mut self, ms: u64) -> Self {
        self.unread_poll_interval_ms = ms;
        self
    }

    /// Set the realtime settings.
    #[must_use]
    pub fn with_realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.realtime = realtime;
        self
    }

    /// Request timeout as a Duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Unread-count polling interval as a Duration.
    #[must_use]
    pub const fn unread_poll_interval(&self) -> Duration {
        Duration::from_millis(self.unread_poll_interval_ms)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> CoreResult<()> {
        if !matches!(self.api_base_url.scheme(), "http" | "https") {
            return Err(CoreError::InvalidConfig(format!(
                "api_base_url must be http(s), got {}",
                self.api_base_url.scheme()
            )));
        }

        if !matches!(self.realtime_url.scheme(), "ws" | "wss" | "http" | "https") {
            return Err(CoreError::InvalidConfig(format!(
                "realtime_url must be ws(s) or http(s), got {}",
                self.realtime_url.scheme()
            )));
        }

        if self.page_size == 0 {
            return Err(CoreError::InvalidConfig("page_size must be > 0".into()));
        }

        if self.unread_poll_interval_ms == 0 {
            return Err(CoreError::InvalidConfig(
                "unread_poll_interval_ms must be > 0".into(),
            ));
        }

        self.realtime
            .backoff
            .validate()
            .map_err(|errors| CoreError::InvalidConfig(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn from_lookup_reads_both_origins() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            (API_URL_VAR, "https://api.example.com/api"),
            (REALTIME_URL_VAR, "wss://rt.example.com"),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url.as_str(), "https://api.example.com/api");
        assert_eq!(config.realtime_url.scheme(), "wss");
        assert_eq!(config.page_size, 20);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_lookup_missing_realtime() {
        let err = ClientConfig::from_lookup(lookup_from(&[(API_URL_VAR, "https://api")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingInput(REALTIME_URL_VAR)));
    }

    #[test]
    fn from_lookup_bad_url() {
        let err = ClientConfig::from_lookup(lookup_from(&[
            (API_URL_VAR, "not a url"),
            (REALTIME_URL_VAR, "wss://rt"),
        ]))
        .unwrap_err();
        assert!(matches!(err, CoreError::UrlError(_)));
    }

    #[test]
    fn validate_rejects_zero_page_size() {
        let config = ClientConfig::new(
            "https://api.example.com".parse().unwrap(),
            "wss://rt.example.com".parse().unwrap(),
        )
        .with_page_size(0);
        assert!(matches!(
            config.validate(),
            Err(CoreError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_ftp_api() {
        let config = ClientConfig::new(
            "ftp://api.example.com".parse().unwrap(),
            "wss://rt.example.com".parse().unwrap(),
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("api_base_url"));
    }

    #[test]
    fn deserialize_with_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"api_base_url":"https://api.example.com","realtime_url":"wss://rt.example.com"}"#,
        )
        .unwrap();
        assert_eq!(config.unread_poll_interval(), Duration::from_secs(60));
        assert_eq!(config.realtime, RealtimeConfig::default());
    }

    #[test]
    fn realtime_ping_interval_zero_disables() {
        let realtime = RealtimeConfig::new().with_ping_interval_ms(0);
        assert!(realtime.ping_interval().is_none());
        assert_eq!(
            RealtimeConfig::default().connect_timeout(),
            Duration::from_secs(10)
        );
    }
}
