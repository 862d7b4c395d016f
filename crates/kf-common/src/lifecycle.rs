//! Resource lifecycle client
//!
//! Every kf command and every test scope talks to the cluster through
//! [`LifecycleClient`]: `create`, `delete`, and `mutate`, all keyed by
//! namespace and name.
//!
//! # Optimistic concurrency
//!
//! `mutate` is a read-modify-write over the object's `resourceVersion`. The
//! fetched version is sent back with the write; if another writer got there
//! first the store rejects it with a conflict and the whole
//! fetch-apply-write cycle runs again against fresh state. No local lock is
//! held, so any number of external writers may race the loop. After
//! [`ConflictPolicy::max_retries`] retries the loop gives up with
//! [`Error::Conflict`] and nothing has been written.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use kube::Resource;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, warn};

use crate::retry::RetryConfig;
use crate::{Error, Result};

/// Default number of conflict retries for `mutate`
pub const DEFAULT_CONFLICT_RETRIES: u32 = 5;

/// Namespaced, versioned object store.
///
/// This is the seam between kf and the API server. [`crate::kube_store::KubeStore`]
/// is the real implementation; tests use [`crate::fake::FakeStore`] or a mock.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VersionedStore<R>: Send + Sync
where
    R: Send + Sync + 'static,
{
    /// Fetch the current object, including its resourceVersion
    async fn get(&self, namespace: &str, name: &str) -> Result<R>;

    /// Create a new object, returning it as stored
    async fn create(&self, namespace: &str, obj: &R) -> Result<R>;

    /// Replace an object, conditioned on `obj`'s resourceVersion matching the
    /// stored one. A mismatch is reported as [`Error::Conflict`].
    async fn replace(&self, namespace: &str, name: &str, obj: &R) -> Result<R>;

    /// Delete an object
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Retry policy for version conflicts in `mutate`
#[derive(Clone, Debug)]
pub struct ConflictPolicy {
    /// Retries after the first attempt; `max_retries + 1` attempts in total
    pub max_retries: u32,
    /// Delay sequence between attempts
    pub backoff: RetryConfig,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_CONFLICT_RETRIES,
            backoff: RetryConfig {
                max_attempts: DEFAULT_CONFLICT_RETRIES + 1,
                initial_delay: std::time::Duration::from_millis(10),
                max_delay: std::time::Duration::from_secs(1),
                backoff_multiplier: 2.0,
                jitter: true,
            },
        }
    }
}

impl ConflictPolicy {
    /// Retry `max_retries` times without sleeping between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: RetryConfig::immediate(max_retries + 1),
        }
    }

    /// Total attempts allowed by this policy
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Read-modify-write `name` in `namespace` until the write lands.
///
/// `mutator` is applied to a freshly fetched copy on every attempt, so it must
/// be repeatable. An error from `mutator` aborts without writing. A conflict
/// on every one of `policy.max_attempts()` attempts returns
/// [`Error::Conflict`] with the attempt count; any other error is returned
/// as-is on first occurrence.
pub async fn transform<R, S, F>(
    store: &S,
    namespace: &str,
    name: &str,
    policy: &ConflictPolicy,
    mut mutator: F,
) -> Result<R>
where
    R: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
    S: VersionedStore<R> + ?Sized,
    F: FnMut(&mut R) -> Result<()>,
{
    let kind = R::kind(&());
    let max_attempts = policy.max_attempts();
    let mut backoff = policy.backoff.backoff();

    for attempt in 1..=max_attempts {
        let current = store.get(namespace, name).await?;
        let version =
            current
                .meta()
                .resource_version
                .clone()
                .ok_or_else(|| Error::MissingVersion {
                    kind: kind.to_string(),
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })?;

        let mut desired = current;
        mutator(&mut desired)?;
        // The write must be conditioned on what was read, whatever the mutator did
        desired.meta_mut().resource_version = Some(version.clone());

        match store.replace(namespace, name, &desired).await {
            Ok(updated) => {
                debug!(
                    kind = %kind,
                    namespace = %namespace,
                    name = %name,
                    attempt = attempt,
                    "Mutation applied"
                );
                return Ok(updated);
            }
            Err(e) if e.is_conflict() => {
                if attempt == max_attempts {
                    break;
                }
                let delay = backoff.next_delay();
                warn!(
                    kind = %kind,
                    namespace = %namespace,
                    name = %name,
                    attempt = attempt,
                    resource_version = %version,
                    delay_ms = delay.as_millis(),
                    "Write conflicted with a concurrent update, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    warn!(
        kind = %kind,
        namespace = %namespace,
        name = %name,
        attempts = max_attempts,
        "Giving up after repeated conflicts"
    );
    Err(Error::Conflict {
        kind: kind.to_string(),
        namespace: namespace.to_string(),
        name: name.to_string(),
        attempts: max_attempts,
    })
}

/// Namespaced create/delete/mutate client for one resource kind
pub struct LifecycleClient<R> {
    store: Arc<dyn VersionedStore<R>>,
    policy: ConflictPolicy,
}

impl<R> Clone for LifecycleClient<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            policy: self.policy.clone(),
        }
    }
}

impl<R> LifecycleClient<R>
where
    R: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + 'static,
{
    /// Create a client over `store` with the default conflict policy
    pub fn new(store: impl VersionedStore<R> + 'static) -> Self {
        Self::from_arc(Arc::new(store))
    }

    /// Create a client over a shared store
    pub fn from_arc(store: Arc<dyn VersionedStore<R>>) -> Self {
        Self {
            store,
            policy: ConflictPolicy::default(),
        }
    }

    /// Replace the conflict policy
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Conflict policy in effect
    pub fn policy(&self) -> &ConflictPolicy {
        &self.policy
    }

    /// Fetch an object
    pub async fn get(&self, namespace: &str, name: &str) -> Result<R> {
        self.store.get(namespace, name).await
    }

    /// Create `obj` in `namespace`, returning the stored name
    pub async fn create(&self, namespace: &str, obj: &R) -> Result<String> {
        let created = self.store.create(namespace, obj).await?;
        let name = created.meta().name.clone().unwrap_or_default();
        debug!(kind = %R::kind(&()), namespace = %namespace, name = %name, "Created");
        Ok(name)
    }

    /// Delete `name` from `namespace`
    pub async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.store.delete(namespace, name).await?;
        debug!(kind = %R::kind(&()), namespace = %namespace, name = %name, "Deleted");
        Ok(())
    }

    /// Apply `mutator` with optimistic-concurrency retries, see [`transform`]
    pub async fn mutate<F>(&self, namespace: &str, name: &str, mutator: F) -> Result<R>
    where
        F: FnMut(&mut R) -> Result<()>,
    {
        transform(self.store.as_ref(), namespace, name, &self.policy, mutator).await
    }
}
