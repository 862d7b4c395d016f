//! Nested with-resource scopes
//!
//! [`Orchestrator::with_resource`] creates a resource, waits for it to become
//! ready, hands a child context to the body and deletes the resource again,
//! however the body ends. Scopes compose by nesting bodies, so teardown runs
//! in reverse order of creation:
//!
//! ```text
//! create broker-app
//!   create broker
//!     create instance
//!       body
//!     delete instance
//!   delete broker
//! delete broker-app
//! ```

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::context::{SpaceKey, TestContext};
use crate::readiness::{self, Readiness, ScopeTimeouts};
use crate::HarnessError;

/// Maximum length of a generated name; names double as DNS labels
pub const MAX_NAME_LEN: usize = 63;

/// Namespaced identity of a provisioned object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// Namespace the object lives in
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ResourceRef {
    /// Reference `name` in the space bound in `ctx`.
    ///
    /// # Panics
    ///
    /// Panics if no enclosing scope bound [`SpaceKey`].
    #[track_caller]
    pub fn in_space(ctx: &TestContext, name: &str) -> Self {
        Self {
            namespace: ctx.get::<SpaceKey>(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One kind of resource a scope can create and destroy
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Handle returned by `create` and passed back to `destroy`
    type Id: fmt::Debug + Send + Sync;

    /// Resource kind, for logs and errors
    fn kind(&self) -> &'static str;

    /// Prefix for generated names
    fn base_name(&self) -> &str;

    /// Create the resource under the generated `name`
    async fn create(&self, ctx: &TestContext, name: &str) -> kf_common::Result<Self::Id>;

    /// Delete the resource
    async fn destroy(&self, id: &Self::Id) -> kf_common::Result<()>;

    /// How readiness is established after creation
    fn readiness(&self) -> Readiness {
        Readiness::Probe
    }

    /// Returns true once the resource is usable
    async fn probe_ready(&self, _id: &Self::Id) -> kf_common::Result<bool> {
        Ok(true)
    }

    /// Child context for the body, carrying whatever nested scopes need
    fn bind(&self, ctx: &TestContext, id: &Self::Id) -> TestContext;
}

/// A teardown that failed, kept for the end-of-run report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    /// Resource kind
    pub kind: &'static str,
    /// Generated name
    pub name: String,
    /// Error message from the delete
    pub message: String,
}

static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates names unique across repeated and concurrent runs.
///
/// Names are `{base}-{run}-{n}`: `run` is derived from the clock and process
/// id when the generator is built, `n` is a process-wide counter.
#[derive(Debug, Clone)]
pub struct NameGenerator {
    run_id: String,
}

impl NameGenerator {
    /// Create a generator for this process
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let pid = std::process::id() as u64;
        Self {
            run_id: format!("{:06x}", (nanos ^ (pid << 20)) & 0xFF_FFFF),
        }
    }

    /// Create a generator with a fixed run id
    pub fn with_run_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    /// Next unique name for `base`
    pub fn generate(&self, base: &str) -> String {
        let n = NAME_COUNTER.fetch_add(1, Ordering::Relaxed);
        let suffix = format!("-{}-{}", self.run_id, n);
        let mut keep = MAX_NAME_LEN.saturating_sub(suffix.len()).min(base.len());
        while !base.is_char_boundary(keep) {
            keep -= 1;
        }
        let base = base[..keep].trim_end_matches('-');
        format!("{base}{suffix}")
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs with-resource scopes and keeps the record of failed teardowns
pub struct Orchestrator {
    names: NameGenerator,
    timeouts: ScopeTimeouts,
    cancel: CancellationToken,
    teardown_failures: Mutex<Vec<TeardownFailure>>,
}

impl Orchestrator {
    /// Create an orchestrator with the given timeouts
    pub fn new(timeouts: ScopeTimeouts) -> Self {
        Self {
            names: NameGenerator::new(),
            timeouts,
            cancel: CancellationToken::new(),
            teardown_failures: Mutex::new(Vec::new()),
        }
    }

    /// Use `names` for generated names
    pub fn with_names(mut self, names: NameGenerator) -> Self {
        self.names = names;
        self
    }

    /// Abort readiness waits when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts in-flight readiness waits
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Timeouts applied to every scope
    pub fn timeouts(&self) -> &ScopeTimeouts {
        &self.timeouts
    }

    /// Teardowns that failed so far, in the order they happened
    pub fn teardown_failures(&self) -> Vec<TeardownFailure> {
        self.teardown_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Provision a resource for the duration of `body`.
    ///
    /// If creation fails the body never runs and nothing is torn down.
    /// Otherwise the resource is destroyed exactly once after the body,
    /// whether it returned, failed, panicked or never ran because readiness
    /// timed out or was cancelled. A body panic is re-raised after teardown.
    ///
    /// A failed teardown is logged and recorded in
    /// [`teardown_failures`](Self::teardown_failures). It is returned as
    /// [`HarnessError::Teardown`] only when the body itself succeeded, so
    /// it never hides the body's own failure.
    pub async fn with_resource<P, B, Fut, T>(
        &self,
        ctx: &TestContext,
        provisioner: &P,
        body: B,
    ) -> Result<T, HarnessError>
    where
        P: Provisioner + ?Sized,
        B: FnOnce(TestContext) -> Fut,
        Fut: Future<Output = Result<T, HarnessError>>,
    {
        let kind = provisioner.kind();
        let name = self.names.generate(provisioner.base_name());

        info!(kind, name = %name, "Creating");
        let id = provisioner
            .create(ctx, &name)
            .await
            .map_err(|source| HarnessError::Create {
                kind,
                name: name.clone(),
                source,
            })?;

        // The resource exists from here on; every path below reaches teardown.
        let outcome = AssertUnwindSafe(async {
            self.await_ready(provisioner, &id, kind, &name).await?;
            let child = provisioner.bind(ctx, &id);
            body(child).await
        })
        .catch_unwind()
        .await;

        info!(kind, name = %name, "Deleting");
        let teardown = provisioner.destroy(&id).await;
        if let Err(e) = &teardown {
            error!(kind, name = %name, error = %e, "Teardown failed");
            self.teardown_failures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(TeardownFailure {
                    kind,
                    name: name.clone(),
                    message: e.to_string(),
                });
        }

        match outcome {
            Err(panic) => {
                warn!(kind, name = %name, "Scope body panicked; resumed after teardown");
                std::panic::resume_unwind(panic)
            }
            Ok(Err(e)) => Err(e),
            Ok(Ok(value)) => match teardown {
                Ok(()) => Ok(value),
                Err(source) => Err(HarnessError::Teardown { kind, name, source }),
            },
        }
    }

    async fn await_ready<P>(
        &self,
        provisioner: &P,
        id: &P::Id,
        kind: &'static str,
        name: &str,
    ) -> Result<(), HarnessError>
    where
        P: Provisioner + ?Sized,
    {
        match provisioner.readiness() {
            Readiness::Probe => {
                readiness::wait_for_ready(kind, name, &self.timeouts, &self.cancel, || {
                    provisioner.probe_ready(id)
                })
                .await
            }
            Readiness::FixedDelay(delay) => {
                readiness::settle(kind, name, delay, &self.cancel).await
            }
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(ScopeTimeouts::from_env())
    }
}
