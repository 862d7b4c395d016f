//! Error types for kf API operations
//!
//! Errors carry the resource kind, namespace and name involved so that a
//! failing command or test can say exactly which object it was touching.

use thiserror::Error;

/// Main error type for kf API operations
#[derive(Debug, Error)]
pub enum Error {
    /// Transport or server error that is neither a missing object nor a
    /// version conflict
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Bad or missing input, reported before any mutation
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },

    /// The named object does not exist
    #[error("{kind} {name:?} not found in namespace {namespace:?}")]
    NotFound {
        /// Resource kind (e.g. "App")
        kind: String,
        /// Namespace that was searched
        namespace: String,
        /// Object name
        name: String,
    },

    /// An object with the same name already exists
    #[error("{kind} {name:?} already exists in namespace {namespace:?}")]
    AlreadyExists {
        /// Resource kind
        kind: String,
        /// Target namespace
        namespace: String,
        /// Object name
        name: String,
    },

    /// The object changed between read and write
    ///
    /// `attempts` counts the full read-modify-write cycles that were tried.
    #[error(
        "conflict updating {kind} {name:?} in namespace {namespace:?}: \
         modified concurrently, gave up after {attempts} attempt(s)"
    )]
    Conflict {
        /// Resource kind
        kind: String,
        /// Namespace of the object
        namespace: String,
        /// Object name
        name: String,
        /// Number of read-modify-write attempts made
        attempts: u32,
    },

    /// A fetched object carried no resourceVersion, so it can't be written
    /// back safely
    #[error("{kind} {name:?} in namespace {namespace:?} has no resourceVersion")]
    MissingVersion {
        /// Resource kind
        kind: String,
        /// Namespace of the object
        namespace: String,
        /// Object name
        name: String,
    },

    /// The mutator refused to produce a new desired state
    #[error("mutation of {kind} {name:?} rejected: {message}")]
    Mutation {
        /// Resource kind
        kind: String,
        /// Object name
        name: String,
        /// Reason given by the mutator
        message: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error for the given object
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a single-attempt conflict error, as returned by one rejected write
    pub fn conflict(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            attempts: 1,
        }
    }

    /// Create a mutation error; mutators use this to abort a `mutate` call
    pub fn mutation(
        kind: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Mutation {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns true for a version-conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns true when the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Classify a kube-rs error for an operation on a specific object.
    ///
    /// 404 becomes `NotFound`. 409 becomes `AlreadyExists` on create and
    /// `Conflict` on every other verb. Everything else stays a transport error.
    pub fn from_kube(
        source: kube::Error,
        verb: Verb,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Self {
        let code = match &source {
            kube::Error::Api(ae) => Some(ae.code),
            _ => None,
        };

        match code {
            Some(404) => Self::not_found(kind, namespace, name),
            Some(409) if verb == Verb::Create => Self::AlreadyExists {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            Some(409) => Self::conflict(kind, namespace, name),
            _ => Self::Kube { source },
        }
    }
}

/// API verb, used when classifying server responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Read a single object
    Get,
    /// Create a new object
    Create,
    /// Conditional full replace
    Replace,
    /// Delete an object
    Delete,
}
