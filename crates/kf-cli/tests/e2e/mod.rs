//! End-to-end tests against a live cluster
//!
//! These tests provision real service brokers, instances and bindings in the
//! cluster of the current kubeconfig and always clean up after themselves.
//! Before the first test touches the cluster, `kf doctor`'s checks run once
//! for the whole process; if they fail, that test reports why and the rest
//! proceed on their own.
//!
//! # Running Tests
//!
//! ```bash
//! KF_E2E_SPACE=integration \
//! cargo test -p kf-cli --features cluster-e2e --test e2e -- --nocapture
//! ```
//!
//! `KF_KUBECONFIG` selects a kubeconfig other than the default and
//! `KF_TEST_READINESS_TIMEOUT_SECS` bounds each readiness wait.

#[cfg(feature = "cluster-e2e")]
mod context;
#[cfg(feature = "cluster-e2e")]
mod service_catalog_e2e;
