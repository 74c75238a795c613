use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://api.gateway.attomdata.com";

/// Runtime settings consumed by the transport, resolvers and cache.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Transport retries after the first attempt.
    pub max_retries: u32,
    /// Base of the transport's `base * 2^attempt` backoff.
    pub retry_base: Duration,
    /// Spreads each transport backoff by +/- 50%.
    pub retry_jitter: bool,
    /// Whole-lookup attempts made by each fallback resolver.
    pub resolver_attempts: u32,
    pub resolver_delay: Duration,
    pub cache_ttl: Duration,
    pub timeout_ms: u64,
    /// Zero disables outbound throttling.
    pub quota_per_minute: u32,
    pub places_api_key: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: String::from(DEFAULT_BASE_URL),
            max_retries: 3,
            retry_base: Duration::from_millis(500),
            retry_jitter: false,
            resolver_attempts: 3,
            resolver_delay: Duration::from_millis(500),
            cache_ttl: Duration::from_secs(3_600),
            timeout_ms: 10_000,
            quota_per_minute: 200,
            places_api_key: None,
        }
    }
}

impl GatewayConfig {
    /// Defaults overlaid with `PROPGATE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        config.api_key = get("PROPGATE_API_KEY").or_else(|| get("ATTOM_API_KEY"));
        config.places_api_key = get("PROPGATE_PLACES_API_KEY");
        if let Some(base_url) = get("PROPGATE_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_owned();
        }
        if let Some(value) = get("PROPGATE_MAX_RETRIES") {
            config.max_retries = parse("PROPGATE_MAX_RETRIES", &value, "a non-negative integer")?;
        }
        if let Some(value) = get("PROPGATE_RETRY_BASE_MS") {
            config.retry_base = Duration::from_millis(parse(
                "PROPGATE_RETRY_BASE_MS",
                &value,
                "milliseconds",
            )?);
        }
        if let Some(value) = get("PROPGATE_RETRY_JITTER") {
            config.retry_jitter = parse("PROPGATE_RETRY_JITTER", &value, "true or false")?;
        }
        if let Some(value) = get("PROPGATE_RESOLVER_ATTEMPTS") {
            let attempts: u32 = parse("PROPGATE_RESOLVER_ATTEMPTS", &value, "a positive integer")?;
            if attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "PROPGATE_RESOLVER_ATTEMPTS",
                    value,
                    expected: "a positive integer",
                });
            }
            config.resolver_attempts = attempts;
        }
        if let Some(value) = get("PROPGATE_RESOLVER_DELAY_MS") {
            config.resolver_delay = Duration::from_millis(parse(
                "PROPGATE_RESOLVER_DELAY_MS",
                &value,
                "milliseconds",
            )?);
        }
        if let Some(value) = get("PROPGATE_CACHE_TTL_SECS") {
            config.cache_ttl =
                Duration::from_secs(parse("PROPGATE_CACHE_TTL_SECS", &value, "seconds")?);
        }
        if let Some(value) = get("PROPGATE_TIMEOUT_MS") {
            config.timeout_ms = parse("PROPGATE_TIMEOUT_MS", &value, "milliseconds")?;
        }
        if let Some(value) = get("PROPGATE_QUOTA_PER_MINUTE") {
            config.quota_per_minute =
                parse("PROPGATE_QUOTA_PER_MINUTE", &value, "requests per minute")?;
        }

        Ok(config)
    }

    /// The API key, or the fatal startup error when it is absent.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}

fn parse<T: FromStr>(name: &'static str, value: &str, expected: &'static str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            name,
            value: value.to_owned(),
            expected,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = GatewayConfig::from_lookup(lookup(&[])).expect("defaults parse");

        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.resolver_attempts, 3);
        assert_eq!(config.resolver_delay, Duration::from_millis(500));
        assert_eq!(
            config.require_api_key(),
            Err(ConfigError::MissingApiKey)
        );
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("ATTOM_API_KEY", "legacy"),
            ("PROPGATE_BASE_URL", "https://upstream.test/"),
            ("PROPGATE_MAX_RETRIES", "1"),
            ("PROPGATE_RESOLVER_DELAY_MS", "0"),
            ("PROPGATE_CACHE_TTL_SECS", "60"),
        ]))
        .expect("valid overrides");

        assert_eq!(config.require_api_key(), Ok("legacy"));
        assert_eq!(config.base_url, "https://upstream.test");
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.resolver_delay, Duration::ZERO);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
    }

    #[test]
    fn retry_jitter_is_opt_in() {
        let config = GatewayConfig::from_lookup(lookup(&[("PROPGATE_RETRY_JITTER", "true")]))
            .expect("valid flag");
        assert!(config.retry_jitter);

        let error = GatewayConfig::from_lookup(lookup(&[("PROPGATE_RETRY_JITTER", "sometimes")]))
            .expect_err("not a boolean");
        assert!(matches!(
            error,
            ConfigError::InvalidValue {
                name: "PROPGATE_RETRY_JITTER",
                ..
            }
        ));
    }

    #[test]
    fn primary_key_wins_over_legacy_name() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("PROPGATE_API_KEY", "primary"),
            ("ATTOM_API_KEY", "legacy"),
        ]))
        .expect("valid");
        assert_eq!(config.require_api_key(), Ok("primary"));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let error = GatewayConfig::from_lookup(lookup(&[("PROPGATE_MAX_RETRIES", "lots")]))
            .expect_err("non-numeric retries");
        assert!(matches!(
            error,
            ConfigError::InvalidValue {
                name: "PROPGATE_MAX_RETRIES",
                ..
            }
        ));
    }

    #[test]
    fn zero_resolver_attempts_are_rejected() {
        let error = GatewayConfig::from_lookup(lookup(&[("PROPGATE_RESOLVER_ATTEMPTS", "0")]))
            .expect_err("zero attempts");
        assert!(matches!(error, ConfigError::InvalidValue { .. }));
    }
}
