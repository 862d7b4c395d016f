//! Error types for the CLI

use std::process::ExitCode;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Api(#[from] kf_common::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    CommandFailed { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }

    /// Returns true when the error says the named object doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api(e) if e.is_not_found())
    }

    /// Process exit status for this error. Usage errors never get here:
    /// clap exits with status 2 while parsing.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_print_without_prefix() {
        let err = Error::from(kf_common::Error::not_found("ServiceBroker", "dev", "mybroker"));
        assert_eq!(
            err.to_string(),
            "ServiceBroker \"mybroker\" not found in namespace \"dev\""
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn validation_is_not_a_lookup_failure() {
        let err = Error::validation("no space targeted");
        assert!(!err.is_not_found());
        assert_eq!(err.exit_code(), ExitCode::FAILURE);
    }
}
