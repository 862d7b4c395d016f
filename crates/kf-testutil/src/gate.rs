//! Run an environment health check at most once per process
//!
//! Integration tests share one cluster, so checking it before every test is
//! wasted work. A [`PreconditionGate`] runs the check for the first caller
//! only. Callers arriving while it runs wait for it to finish, and later
//! callers return immediately without re-running it, pass or fail. A check
//! whose caller is dropped mid-flight (a test timeout, an aborted task) is
//! recorded as a failure and is not retried either.
//!
//! ```ignore
//! static CLUSTER_HEALTHY: PreconditionGate = PreconditionGate::new();
//!
//! CLUSTER_HEALTHY.run(|| async { doctor(&client).await }).await?;
//! ```

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;

use futures::FutureExt;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::HarnessError;

const UNCHECKED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;

/// Progress of a [`PreconditionGate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// No caller has started the check
    Unchecked,
    /// The check is executing
    Running,
    /// The check finished; its outcome is recorded
    Done,
}

/// Single-execution gate around an environment check
pub struct PreconditionGate {
    state: AtomicU8,
    outcome: OnceLock<Result<(), String>>,
    // Initialised once the outcome is recorded; waiters queue on it
    done: OnceCell<()>,
}

impl PreconditionGate {
    /// Create a gate in the unchecked state
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNCHECKED),
            outcome: OnceLock::new(),
            done: OnceCell::const_new(),
        }
    }

    /// Current progress
    pub fn state(&self) -> GateState {
        match self.state.load(Ordering::Acquire) {
            UNCHECKED => GateState::Unchecked,
            RUNNING => GateState::Running,
            _ => GateState::Done,
        }
    }

    /// Recorded outcome, once the check has finished
    pub fn outcome(&self) -> Option<&Result<(), String>> {
        self.outcome.get()
    }

    /// Run `check` unless some caller already has.
    ///
    /// The caller that executes the check gets its failure back as
    /// [`HarnessError::Precondition`]; a panic inside the check is recorded
    /// as a failure too. Every other caller returns `Ok(())` once the check
    /// is done, whatever its outcome: the failure is reported once, by the
    /// test that ran it.
    pub async fn run<F, Fut, E>(&self, check: F) -> Result<(), HarnessError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        let ran = AtomicBool::new(false);
        let ran_ref = &ran;

        self.done
            .get_or_init(move || async move {
                // An earlier executor was dropped mid-check and recorded that
                if self.outcome.get().is_some() {
                    return;
                }
                ran_ref.store(true, Ordering::Release);
                self.state.store(RUNNING, Ordering::Release);

                let mut guard = CancelGuard {
                    gate: self,
                    armed: true,
                };
                let result = match AssertUnwindSafe(check()).catch_unwind().await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(panic) => Err(format!("check panicked: {}", panic_message(&*panic))),
                };
                guard.armed = false;

                match &result {
                    Ok(()) => info!("Precondition check passed"),
                    Err(e) => error!(error = %e, "Precondition check failed"),
                }
                self.finish(result);
            })
            .await;

        if !ran.load(Ordering::Acquire) {
            return Ok(());
        }

        match self.outcome.get() {
            Some(Err(message)) => Err(HarnessError::Precondition {
                message: message.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn finish(&self, result: Result<(), String>) {
        let _ = self.outcome.set(result);
        self.state.store(DONE, Ordering::Release);
    }
}

/// Records a failed outcome if the executing caller is dropped mid-check
struct CancelGuard<'a> {
    gate: &'a PreconditionGate,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("Precondition check cancelled before it completed");
        self.gate
            .finish(Err("check was cancelled before it completed".to_string()));
    }
}

impl Default for PreconditionGate {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
