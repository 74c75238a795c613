//! Retrying transport to the upstream property-data provider.
//!
//! Builds the final URL from a path template and a parameter bag, executes it
//! with bounded exponential backoff, and folds transport failures and
//! upstream-semantic failures into one [`StructuredError`].

use std::sync::Arc;

use serde_json::Value;

use crate::config::GatewayConfig;
use crate::error::{ConfigError, StructuredError};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::params::{self, ParamBag};
use crate::retry::RetryConfig;
use crate::throttling::UpstreamThrottle;

/// Substituted for path placeholders with no matching parameter; the
/// upstream path grammar reads it as an omitted segment.
pub const OMITTED_SEGMENT: &str = "-";

/// Per-call options for [`Transport::fetch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Overrides the transport's configured retry count.
    pub max_retries: Option<u32>,
}

impl FetchOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

pub struct Transport {
    http: Arc<dyn HttpClient>,
    base_url: String,
    auth: HttpAuth,
    retry: RetryConfig,
    timeout_ms: u64,
    throttle: UpstreamThrottle,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Fails with [`ConfigError::MissingApiKey`] when no key is configured.
    pub fn new(config: &GatewayConfig, http: Arc<dyn HttpClient>) -> Result<Self, ConfigError> {
        let api_key = config.require_api_key()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            auth: HttpAuth::api_key(api_key),
            retry: RetryConfig::exponential(config.max_retries, config.retry_base)
                .with_jitter(config.retry_jitter),
            timeout_ms: config.timeout_ms,
            throttle: UpstreamThrottle::per_minute(config.quota_per_minute),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_throttle(mut self, throttle: UpstreamThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, path_template: &str, query: &ParamBag) -> String {
        build_url(&self.base_url, path_template, query)
    }

    /// Executes `path_template` against the upstream host.
    ///
    /// Any failure (network error, non-2xx status, unparseable body, or a
    /// non-zero embedded status code) is retried until the budget runs out,
    /// sleeping `base * 2^attempt` between attempts.
    pub async fn fetch(
        &self,
        path_template: &str,
        query: &ParamBag,
        options: &FetchOptions,
    ) -> Result<Value, StructuredError> {
        let url = self.url_for(path_template, query);
        let retry = match options.max_retries {
            Some(max_retries) => RetryConfig {
                max_retries,
                ..self.retry.clone()
            },
            None => self.retry.clone(),
        };
        let attempts = retry.total_attempts();

        let request = HttpRequest::get(url.as_str())
            .with_header("accept", "application/json")
            .with_auth(&self.auth)
            .with_timeout_ms(self.timeout_ms);

        let mut last_error = None;
        for attempt in 0..attempts {
            self.throttle.until_ready().await;

            match self.attempt(request.clone()).await {
                Ok(payload) => {
                    tracing::debug!(url = %url, attempt, "upstream request succeeded");
                    return Ok(payload);
                }
                Err(error) => {
                    tracing::debug!(url = %url, attempt, error = %error, "upstream attempt failed");
                    last_error = Some(error);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| StructuredError::new("no upstream attempt was made"));
        tracing::warn!(url = %url, attempts, error = %error, "upstream retries exhausted");
        Err(error.exhausted(attempts, url))
    }

    async fn attempt(&self, request: HttpRequest) -> Result<Value, StructuredError> {
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|error| StructuredError::new(format!("transport error: {}", error.message())))?;

        if !response.is_success() {
            return Err(StructuredError::new(format!(
                "upstream returned status {}",
                response.status
            ))
            .with_status(response.status)
            .with_body(response.body));
        }

        let payload: Value = serde_json::from_str(&response.body).map_err(|error| {
            StructuredError::new(format!("failed to parse upstream response: {error}"))
                .with_status(response.status)
                .with_body(response.body.clone())
        })?;

        if let Some((code, message)) = embedded_failure(&payload) {
            return Err(StructuredError::new(format!(
                "upstream status code {code}: {message}"
            ))
            .with_status(response.status)
            .with_body(response.body));
        }

        Ok(payload)
    }
}

/// Returns the embedded `status.code` and `status.msg` when the code is non-zero.
fn embedded_failure(payload: &Value) -> Option<(i64, String)> {
    let status = payload.get("status")?;
    let code = match status.get("code")? {
        Value::Number(number) => number.as_i64()?,
        Value::String(text) => text.trim().parse().ok()?,
        _ => return None,
    };
    if code == 0 {
        return None;
    }
    let message = status
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("unknown upstream error")
        .to_owned();
    Some((code, message))
}

/// Joins the base URL, the substituted path and the serialized query.
pub fn build_url(base_url: &str, path_template: &str, query: &ParamBag) -> String {
    let mut remaining = query.clone();
    let path = substitute_path(path_template, &mut remaining);
    let query_string = serialize_query(&remaining);

    let mut url = String::with_capacity(base_url.len() + path.len() + query_string.len() + 1);
    url.push_str(base_url.trim_end_matches('/'));
    if !path.starts_with('/') {
        url.push('/');
    }
    url.push_str(&path);
    if !query_string.is_empty() {
        url.push('?');
        url.push_str(&query_string);
    }
    url
}

/// Replaces `{name}` tokens from `query`, matching keys case-insensitively.
///
/// Consumed keys are removed from `query`. Unresolved tokens become
/// [`OMITTED_SEGMENT`].
pub fn substitute_path(template: &str, query: &mut ParamBag) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|offset| open + offset) else {
            break;
        };
        output.push_str(&rest[..open]);
        let name = &rest[open + 1..close];

        let matched = query
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .cloned();
        let segment = matched
            .and_then(|key| query.remove(&key))
            .as_ref()
            .and_then(params::render)
            .filter(|text| !text.trim().is_empty());

        match segment {
            Some(text) => output.push_str(&urlencoding::encode(text.trim())),
            None => output.push_str(OMITTED_SEGMENT),
        }
        rest = &rest[close + 1..];
    }

    output.push_str(rest);
    output
}

/// Serializes non-null entries as `k=v&...` in key order.
pub fn serialize_query(query: &ParamBag) -> String {
    query
        .iter()
        .filter_map(|(key, value)| {
            params::render(value)
                .map(|text| format!("{}={}", urlencoding::encode(key), urlencoding::encode(&text)))
        })
        .collect::<Vec<_>>()
        .join("&")
}
