use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Upstream wording that identifies a missing subject record.
const NO_RECORD_SIGNAL: &str = "Unable to locate a property record";

/// Failure raised by the transport after its retry budget is exhausted.
///
/// Covers both transport failures (network errors, non-2xx statuses) and
/// upstream-semantic failures, where a 2xx body carries a non-zero embedded
/// status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredError {
    message: String,
    http_status: Option<u16>,
    body: Option<String>,
    attempts: u32,
    url: String,
}

impl StructuredError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            http_status: None,
            body: None,
            attempts: 0,
            url: String::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Annotates the last failure with the attempt count and the final URL.
    pub fn exhausted(mut self, attempts: u32, url: impl Into<String>) -> Self {
        self.attempts = attempts;
        self.url = url.into();
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Display for StructuredError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)?;
        if let Some(status) = self.http_status {
            write!(f, " (status {status})")?;
        }
        if self.attempts > 0 {
            write!(f, " after {} attempt(s) [{}]", self.attempts, self.url)?;
        }
        Ok(())
    }
}

impl std::error::Error for StructuredError {}

/// Recognized upstream conditions extracted from a [`StructuredError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamSignal {
    NoRecordFound,
}

impl UpstreamSignal {
    /// The only place upstream error wording is inspected.
    pub fn classify(error: &StructuredError) -> Option<Self> {
        let in_body = error
            .body()
            .is_some_and(|body| body.contains(NO_RECORD_SIGNAL));
        if in_body || error.message().contains(NO_RECORD_SIGNAL) {
            return Some(Self::NoRecordFound);
        }
        None
    }
}

/// Errors surfaced by the query dispatcher.
///
/// Every variant is `Clone` so a single settled outcome can be handed to all
/// callers sharing an in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("unknown endpoint '{id}'")]
    UnknownEndpoint { id: String },

    #[error("invalid query for '{endpoint}': missing {}", missing.join(", "))]
    InvalidQuery {
        endpoint: String,
        missing: Vec<String>,
    },

    #[error("upstream request failed: {0}")]
    Transport(#[from] StructuredError),

    #[error("in-flight request for '{key}' was abandoned before settling")]
    Abandoned { key: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl QueryError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownEndpoint { .. } => "query.unknown_endpoint",
            Self::InvalidQuery { .. } => "query.invalid",
            Self::Transport(_) => "upstream.transport",
            Self::Abandoned { .. } => "query.abandoned",
            Self::Internal(_) => "query.internal",
        }
    }

    pub fn structured(&self) -> Option<&StructuredError> {
        match self {
            Self::Transport(error) => Some(error),
            _ => None,
        }
    }

    pub fn signal(&self) -> Option<UpstreamSignal> {
        self.structured().and_then(UpstreamSignal::classify)
    }
}

/// Configuration errors. A missing API key is the one process-fatal condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("upstream API key is not configured (set PROPGATE_API_KEY)")]
    MissingApiKey,

    #[error("invalid value '{value}' for {name}: expected {expected}")]
    InvalidValue {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Failures of the address-normalization collaborator. Never fatal to a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("geocoding transport error: {0}")]
    Transport(String),

    #[error("geocoding service returned status {status}")]
    Status { status: String },

    #[error("failed to parse geocoding response: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_no_record_signal_from_body() {
        let error = StructuredError::new("upstream returned status 400")
            .with_status(400)
            .with_body(r#"{"status":{"code":-1,"msg":"Unable to locate a property record"}}"#);

        assert_eq!(
            UpstreamSignal::classify(&error),
            Some(UpstreamSignal::NoRecordFound)
        );
    }

    #[test]
    fn classifies_no_record_signal_from_message() {
        let error = StructuredError::new("Unable to locate a property record for address");
        assert_eq!(
            UpstreamSignal::classify(&error),
            Some(UpstreamSignal::NoRecordFound)
        );
    }

    #[test]
    fn unrelated_failures_carry_no_signal() {
        let error = StructuredError::new("connection failed").with_body("gateway timeout");
        assert_eq!(UpstreamSignal::classify(&error), None);
    }

    #[test]
    fn display_includes_status_and_attempts() {
        let error = StructuredError::new("upstream returned status 503")
            .with_status(503)
            .exhausted(4, "https://example.test/a");

        assert_eq!(
            error.to_string(),
            "upstream returned status 503 (status 503) after 4 attempt(s) [https://example.test/a]"
        );
    }

    #[test]
    fn invalid_query_lists_missing_params() {
        let error = QueryError::InvalidQuery {
            endpoint: String::from("schoolProfile"),
            missing: vec![String::from("geoIdV4")],
        };
        assert_eq!(
            error.to_string(),
            "invalid query for 'schoolProfile': missing geoIdV4"
        );
        assert_eq!(error.code(), "query.invalid");
    }
}
