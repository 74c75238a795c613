use thiserror::Error;

use propgate_core::{ConfigError, QueryError};

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("[{}] {}", .0.code(), .0)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidArgument(_) => 2,
            Self::Query(QueryError::UnknownEndpoint { .. } | QueryError::InvalidQuery { .. }) => 2,
            Self::Query(_) => 3,
            Self::Serialization(_) => 4,
            Self::Config(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_mistakes_exit_with_two() {
        let error = CliError::from(QueryError::UnknownEndpoint {
            id: String::from("nope"),
        });
        assert_eq!(error.exit_code(), 2);
        assert_eq!(CliError::InvalidArgument(String::from("x")).exit_code(), 2);
    }

    #[test]
    fn upstream_and_config_failures_have_distinct_codes() {
        let upstream = CliError::from(QueryError::Internal(String::from("boom")));
        assert_eq!(upstream.exit_code(), 3);
        assert_eq!(CliError::from(ConfigError::MissingApiKey).exit_code(), 10);
    }
}
