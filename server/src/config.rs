//! Configuration management for the `tunestream` binary.
//!
//! Everything is read once at startup from environment variables (a `.env`
//! file is loaded first by `main`). Missing keys fall back to defaults; a key
//! that is present but does not parse is a [`ConfigError`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors, reported before anything binds.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `TUNESTREAM_SERVICE` named no known role.
    #[error("Unknown service role '{0}' (expected gateway, catalog, subscriptions, ratings or notifications)")]
    UnknownRole(String),

    /// A value failed to parse.
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        /// Environment variable name
        key: &'static str,
        /// Raw value
        value: String,
        /// Parser message
        reason: String,
    },
}

/// Which service this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// Reverse proxy with admission control
    Gateway,
    /// Artists, albums and songs; emits domain events
    Catalog,
    /// Subscriptions and event fan-out
    Subscriptions,
    /// Ratings and recommendations
    Ratings,
    /// Notification inbox
    Notifications,
}

impl ServiceRole {
    /// Role name as used in `TUNESTREAM_SERVICE` and `/health`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Catalog => "catalog",
            Self::Subscriptions => "subscriptions",
            Self::Ratings => "ratings",
            Self::Notifications => "notifications",
        }
    }

    /// Listening port when `PORT` is unset.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Gateway => 8080,
            Self::Catalog => 8002,
            Self::Ratings => 8003,
            Self::Subscriptions => 8004,
            Self::Notifications => 8005,
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gateway" => Ok(Self::Gateway),
            "catalog" | "content" => Ok(Self::Catalog),
            "subscriptions" => Ok(Self::Subscriptions),
            "ratings" => Ok(Self::Ratings),
            "notifications" => Ok(Self::Notifications),
            _ => Err(ConfigError::UnknownRole(s.to_string())),
        }
    }
}

/// Base URLs of the other services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrls {
    /// `USERS_SERVICE_URL`
    pub users: String,
    /// `CONTENT_SERVICE_URL` (the catalog)
    pub content: String,
    /// `RATINGS_SERVICE_URL`
    pub ratings: String,
    /// `SUBSCRIPTIONS_SERVICE_URL`
    pub subscriptions: String,
    /// `NOTIFICATIONS_SERVICE_URL`
    pub notifications: String,
}

/// A sliding-window budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Requests admitted per window
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
}

/// Circuit breaker settings shared by every breaker in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    /// `BREAKER_MAX_FAILURES`
    pub max_failures: u32,
    /// `BREAKER_RESET_TIMEOUT_SECS`
    pub reset_timeout: Duration,
}

/// Existence probe retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// `PROBE_ATTEMPTS`, including the first call
    pub attempts: u32,
    /// `PROBE_BACKOFF_MS`
    pub backoff: Duration,
}

/// Process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `TUNESTREAM_SERVICE`
    pub role: ServiceRole,
    /// `HOST`
    pub host: String,
    /// `PORT`
    pub port: u16,
    /// Other services
    pub urls: ServiceUrls,
    /// Gateway budget per client IP
    pub gateway_limit: LimitConfig,
    /// Budget for identity login/register/recovery routes
    pub identity_limit: LimitConfig,
    /// `ADMISSION_SWEEP_SECS`
    pub admission_sweep: Duration,
    /// Breakers
    pub breaker: BreakerSettings,
    /// Probes
    pub probe: ProbeSettings,
    /// `HTTP_TIMEOUT_MS`, for service-to-service calls
    pub http_timeout: Duration,
    /// `PROXY_TIMEOUT_MS`, for gateway forwarding
    pub proxy_timeout: Duration,
    /// `EMITTER_MAX_IN_FLIGHT`
    pub emitter_max_in_flight: usize,
    /// `METRICS_ENABLED`
    pub metrics_enabled: bool,
    /// `SHUTDOWN_TIMEOUT_SECS`
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Config::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownRole`] for an unrecognised
    /// `TUNESTREAM_SERVICE` and [`ConfigError::Invalid`] for any value that
    /// does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Lookup(&lookup);

        let role = match env.get("TUNESTREAM_SERVICE") {
            Some(raw) => raw.parse()?,
            None => ServiceRole::Gateway,
        };

        Ok(Self {
            role,
            host: env.string("HOST", "0.0.0.0"),
            port: env.parse("PORT", role.default_port())?,
            urls: ServiceUrls {
                users: env.string("USERS_SERVICE_URL", "http://localhost:8001"),
                content: env.string("CONTENT_SERVICE_URL", "http://localhost:8002"),
                ratings: env.string("RATINGS_SERVICE_URL", "http://localhost:8003"),
                subscriptions: env.string("SUBSCRIPTIONS_SERVICE_URL", "http://localhost:8004"),
                notifications: env.string("NOTIFICATIONS_SERVICE_URL", "http://localhost:8005"),
            },
            gateway_limit: LimitConfig {
                max_requests: env.parse("GATEWAY_RATE_LIMIT", 100)?,
                window: Duration::from_secs(env.parse("GATEWAY_RATE_WINDOW_SECS", 60)?),
            },
            identity_limit: LimitConfig {
                max_requests: env.parse("IDENTITY_RATE_LIMIT", 10)?,
                window: Duration::from_secs(env.parse("IDENTITY_RATE_WINDOW_SECS", 60)?),
            },
            admission_sweep: Duration::from_secs(env.parse("ADMISSION_SWEEP_SECS", 60)?),
            breaker: BreakerSettings {
                max_failures: env.parse("BREAKER_MAX_FAILURES", 3)?,
                reset_timeout: Duration::from_secs(env.parse("BREAKER_RESET_TIMEOUT_SECS", 5)?),
            },
            probe: ProbeSettings {
                attempts: env.parse("PROBE_ATTEMPTS", 2)?,
                backoff: Duration::from_millis(env.parse("PROBE_BACKOFF_MS", 100)?),
            },
            http_timeout: Duration::from_millis(env.parse("HTTP_TIMEOUT_MS", 2000)?),
            proxy_timeout: Duration::from_millis(env.parse("PROXY_TIMEOUT_MS", 5000)?),
            emitter_max_in_flight: env.parse("EMITTER_MAX_IN_FLIGHT", 64)?,
            metrics_enabled: env.flag("METRICS_ENABLED", false)?,
            shutdown_timeout: Duration::from_secs(env.parse("SHUTDOWN_TIMEOUT_SECS", 10)?),
        })
    }

    /// `host:port` to bind.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct Lookup<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Lookup<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(v) => Err(ConfigError::Invalid {
                key,
                value: v,
                reason: "expected true or false".to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.role, ServiceRole::Gateway);
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.gateway_limit.max_requests, 100);
        assert_eq!(config.identity_limit.max_requests, 10);
        assert_eq!(config.identity_limit.window, Duration::from_secs(60));
        assert_eq!(config.breaker.max_failures, 3);
        assert_eq!(config.breaker.reset_timeout, Duration::from_secs(5));
        assert_eq!(config.probe.attempts, 2);
        assert_eq!(config.proxy_timeout, Duration::from_secs(5));
        assert_eq!(config.emitter_max_in_flight, 64);
        assert!(!config.metrics_enabled);
        assert_eq!(config.urls.content, "http://localhost:8002");
    }

    #[test]
    fn port_defaults_follow_role() {
        let ratings = load(&[("TUNESTREAM_SERVICE", "ratings")]).unwrap();
        assert_eq!(ratings.port, 8003);
        let subs = load(&[("TUNESTREAM_SERVICE", "Subscriptions")]).unwrap();
        assert_eq!(subs.port, 8004);
        let pinned = load(&[("TUNESTREAM_SERVICE", "catalog"), ("PORT", "9000")]).unwrap();
        assert_eq!(pinned.port, 9000);
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("GATEWAY_RATE_LIMIT", "5"),
            ("BREAKER_RESET_TIMEOUT_SECS", "30"),
            ("PROBE_BACKOFF_MS", "250"),
            ("METRICS_ENABLED", "true"),
            ("NOTIFICATIONS_SERVICE_URL", "http://notify:9000"),
        ])
        .unwrap();
        assert_eq!(config.gateway_limit.max_requests, 5);
        assert_eq!(config.breaker.reset_timeout, Duration::from_secs(30));
        assert_eq!(config.probe.backoff, Duration::from_millis(250));
        assert!(config.metrics_enabled);
        assert_eq!(config.urls.notifications, "http://notify:9000");
    }

    #[test]
    fn blank_values_use_defaults() {
        let config = load(&[("PORT", "  "), ("HOST", "")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn invalid_numbers_are_errors() {
        let err = load(&[("GATEWAY_RATE_LIMIT", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "GATEWAY_RATE_LIMIT", .. }));

        let err = load(&[("PORT", "70000")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));

        let err = load(&[("METRICS_ENABLED", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "METRICS_ENABLED", .. }));
    }

    #[test]
    fn unknown_role() {
        assert_eq!(
            load(&[("TUNESTREAM_SERVICE", "users")]).unwrap_err(),
            ConfigError::UnknownRole("users".to_string())
        );
    }
}
