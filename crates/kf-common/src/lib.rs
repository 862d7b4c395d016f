//! Common types for kf: resources, errors and the lifecycle client
//!
//! # Modules
//!
//! - [`crd`] - App and service catalog resource definitions
//! - [`lifecycle`] - Namespaced create/delete/mutate with optimistic concurrency
//! - [`kube_store`] - The API-server-backed store
//! - [`fake`] - In-memory store for tests
//! - [`retry`] - Exponential backoff with jitter
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod fake;
pub mod kube_store;
pub mod lifecycle;
pub mod retry;

pub use error::Error;
pub use lifecycle::{transform, ConflictPolicy, LifecycleClient, VersionedStore};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// CRD that must exist for apps to be pushed
pub const APPS_CRD: &str = "apps.kf.dev";

/// CRDs that must exist for the service catalog commands
pub const SERVICE_CATALOG_CRDS: &[&str] = &[
    "servicebrokers.servicecatalog.k8s.io",
    "serviceinstances.servicecatalog.k8s.io",
    "servicebindings.servicecatalog.k8s.io",
];
