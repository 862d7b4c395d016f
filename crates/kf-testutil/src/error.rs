//! Errors surfaced by provisioning scopes

use std::time::Duration;

use thiserror::Error;

/// Error returned by a scope or the precondition gate
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The resource could not be created; no teardown was scheduled
    #[error("failed to create {kind} {name:?}: {source}")]
    Create {
        /// Resource kind
        kind: &'static str,
        /// Generated name
        name: String,
        /// Underlying client error
        #[source]
        source: kf_common::Error,
    },

    /// The resource never became ready
    #[error("{kind} {name:?} not ready after {waited:?}: {last_observation}")]
    ReadinessTimeout {
        /// Resource kind
        kind: &'static str,
        /// Generated name
        name: String,
        /// Time spent waiting
        waited: Duration,
        /// What the last probe saw
        last_observation: String,
    },

    /// The readiness wait was aborted through the cancellation token
    #[error("wait for {kind} {name:?} cancelled")]
    Cancelled {
        /// Resource kind
        kind: &'static str,
        /// Generated name
        name: String,
    },

    /// The body succeeded but the resource could not be deleted
    #[error("failed to delete {kind} {name:?}: {source}")]
    Teardown {
        /// Resource kind
        kind: &'static str,
        /// Generated name
        name: String,
        /// Underlying client error
        #[source]
        source: kf_common::Error,
    },

    /// The one-time environment check failed
    #[error("precondition check failed: {message}")]
    Precondition {
        /// Failure reported by the check
        message: String,
    },

    /// A test body assertion failed
    #[error("{0}")]
    Body(String),

    /// A client call made from a scope body failed
    #[error(transparent)]
    Client(#[from] kf_common::Error),
}

impl HarnessError {
    /// Create a body failure with the given message
    pub fn body(message: impl Into<String>) -> Self {
        Self::Body(message.into())
    }
}
