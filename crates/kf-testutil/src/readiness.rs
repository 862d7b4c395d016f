//! Readiness waiting for freshly created resources

use std::future::Future;
use std::time::Duration;

use kf_common::retry::RetryConfig;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::HarnessError;

/// Environment variable overriding [`ScopeTimeouts::readiness_timeout`], in seconds
pub const READINESS_TIMEOUT_ENV: &str = "KF_TEST_READINESS_TIMEOUT_SECS";

/// Default upper bound on waiting for a resource to become ready
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(180);

/// Default delay for kinds that expose no readiness signal
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Floor on the delay between readiness probes
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How a provisioner's resource signals that it is usable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Poll the provisioner's readiness probe until it reports ready
    Probe,
    /// No observable signal; wait a fixed delay and assume ready
    FixedDelay(Duration),
}

/// Timing knobs shared by every scope of an orchestrator
#[derive(Debug, Clone)]
pub struct ScopeTimeouts {
    /// Upper bound on the readiness wait, probe calls included
    pub readiness_timeout: Duration,
    /// Delay sequence between readiness probes. A non-zero `max_attempts`
    /// caps the number of probes; delays are never shorter than
    /// [`MIN_POLL_INTERVAL`]
    pub poll: RetryConfig,
}

impl Default for ScopeTimeouts {
    fn default() -> Self {
        Self {
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            poll: RetryConfig {
                max_attempts: 0,
                initial_delay: Duration::from_millis(250),
                max_delay: Duration::from_secs(5),
                backoff_multiplier: 2.0,
                jitter: true,
            },
        }
    }
}

impl ScopeTimeouts {
    /// Defaults, with the readiness timeout taken from
    /// `KF_TEST_READINESS_TIMEOUT_SECS` when it is set to a number
    pub fn from_env() -> Self {
        let mut timeouts = Self::default();
        if let Some(secs) = std::env::var(READINESS_TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            timeouts.readiness_timeout = Duration::from_secs(secs);
        }
        timeouts
    }

    /// Override the readiness timeout
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Override the delay sequence between probes
    pub fn with_poll(mut self, poll: RetryConfig) -> Self {
        self.poll = poll;
        self
    }
}

/// Wait until `probe` reports ready.
///
/// The whole wait, including time spent inside probe calls, is bounded by
/// `timeouts.readiness_timeout`. A probe answering `NotFound` counts as "not
/// ready yet": freshly created objects may not be observable immediately.
/// Any other probe error ends the wait. The wait also ends with
/// [`HarnessError::ReadinessTimeout`] once `timeouts.poll.max_attempts`
/// probes (when non-zero) have come back not ready. Cancelling `cancel` ends
/// it with [`HarnessError::Cancelled`].
pub(crate) async fn wait_for_ready<F, Fut>(
    kind: &'static str,
    name: &str,
    timeouts: &ScopeTimeouts,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<(), HarnessError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = kf_common::Result<bool>>,
{
    let started = Instant::now();
    let deadline = started + timeouts.readiness_timeout;
    let mut backoff = timeouts.poll.backoff();
    let mut last_observation = String::from("never probed");
    let mut attempts = 0u32;

    let timed_out = |last_observation: String| HarnessError::ReadinessTimeout {
        kind,
        name: name.to_string(),
        waited: started.elapsed(),
        last_observation,
    };
    let cancelled = || HarnessError::Cancelled {
        kind,
        name: name.to_string(),
    };

    loop {
        attempts += 1;
        let probed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            r = tokio::time::timeout_at(deadline, probe()) => r,
        };

        match probed {
            Err(_) => return Err(timed_out(last_observation)),
            Ok(Ok(true)) => {
                debug!(kind, name, waited = ?started.elapsed(), "Resource ready");
                return Ok(());
            }
            Ok(Ok(false)) => last_observation = "not ready".to_string(),
            Ok(Err(e)) if e.is_not_found() => last_observation = "not observable yet".to_string(),
            Ok(Err(e)) => return Err(HarnessError::Client(e)),
        }

        let max_attempts = timeouts.poll.max_attempts;
        if max_attempts > 0 && attempts >= max_attempts {
            return Err(timed_out(format!(
                "{last_observation} after {attempts} probes"
            )));
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out(last_observation));
        }
        let delay = backoff
            .next_delay()
            .max(MIN_POLL_INTERVAL)
            .min(remaining);
        debug!(kind, name, ?delay, last_observation, "Waiting for resource");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Sleep for `delay` unless cancelled first
pub(crate) async fn settle(
    kind: &'static str,
    name: &str,
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<(), HarnessError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HarnessError::Cancelled {
            kind,
            name: name.to_string(),
        }),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> ScopeTimeouts {
        ScopeTimeouts::default()
            .with_readiness_timeout(Duration::from_secs(10))
            .with_poll(RetryConfig::immediate(0))
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_the_probe_reports_ready() {
        let probes = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        wait_for_ready("App", "a", &fast(), &cancel, move || async move {
            Ok(probes.fetch_add(1, Ordering::SeqCst) >= 2)
        })
        .await
        .unwrap();

        assert_eq!(probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_retried_until_observable() {
        let probes = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        wait_for_ready("App", "a", &fast(), &cancel, move || async move {
            match probes.fetch_add(1, Ordering::SeqCst) {
                0 => Err(kf_common::Error::not_found("App", "dev", "a")),
                _ => Ok(true),
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn never_ready_times_out_with_last_observation() {
        let cancel = CancellationToken::new();
        let timeouts = ScopeTimeouts::default().with_readiness_timeout(Duration::from_secs(30));

        let err = wait_for_ready("ServiceBroker", "b", &timeouts, &cancel, || async {
            Ok(false)
        })
        .await
        .unwrap_err();

        match err {
            HarnessError::ReadinessTimeout {
                kind,
                waited,
                last_observation,
                ..
            } => {
                assert_eq!(kind, "ServiceBroker");
                assert!(waited >= Duration::from_secs(30));
                assert_eq!(last_observation, "not ready");
            }
            other => panic!("expected readiness timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_policy_still_times_out() {
        let probes = &AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let timeouts = fast().with_readiness_timeout(Duration::from_secs(1));

        let err = wait_for_ready("App", "a", &timeouts, &cancel, move || async move {
            probes.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        })
        .await
        .unwrap_err();

        assert!(matches!(err, HarnessError::ReadinessTimeout { .. }));
        // One probe per poll interval at most
        let polled = probes.load(Ordering::SeqCst);
        assert!(polled > 1);
        assert!(polled <= 101, "probed {polled} times in one second");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_policy_still_honours_cancellation() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let err = wait_for_ready("App", "a", &fast(), &cancel, || async { Ok(false) })
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Cancelled { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_cap_ends_the_wait_before_the_deadline() {
        let probes = &AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let timeouts = ScopeTimeouts::default()
            .with_readiness_timeout(Duration::from_secs(60))
            .with_poll(RetryConfig::with_max_attempts(3));
        let start = Instant::now();

        let err = wait_for_ready("App", "a", &timeouts, &cancel, move || async move {
            probes.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        })
        .await
        .unwrap_err();

        assert_eq!(probes.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() < Duration::from_secs(60));
        match err {
            HarnessError::ReadinessTimeout { last_observation, .. } => {
                assert_eq!(last_observation, "not ready after 3 probes");
            }
            other => panic!("expected readiness timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_is_bounded_by_the_deadline() {
        let cancel = CancellationToken::new();
        let timeouts = fast().with_readiness_timeout(Duration::from_secs(5));

        let err = wait_for_ready("App", "a", &timeouts, &cancel, || {
            futures::future::pending::<kf_common::Result<bool>>()
        })
        .await
        .unwrap_err();

        assert!(matches!(err, HarnessError::ReadinessTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_the_wait() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = wait_for_ready("App", "a", &ScopeTimeouts::default(), &cancel, || async {
            Ok(false)
        })
        .await
        .unwrap_err();

        assert!(matches!(err, HarnessError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn probe_errors_other_than_not_found_end_the_wait() {
        let cancel = CancellationToken::new();

        let err = wait_for_ready("App", "a", &fast(), &cancel, || async {
            Err(kf_common::Error::validation("bad probe"))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, HarnessError::Client(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn settle_waits_the_fixed_delay() {
        let cancel = CancellationToken::new();
        let start = Instant::now();

        settle("ServiceBroker", "b", Duration::from_secs(2), &cancel)
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn settle_honours_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = settle("ServiceBroker", "b", Duration::from_secs(3600), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Cancelled { .. }));
    }

    #[test]
    fn defaults_bound_the_wait() {
        let timeouts = ScopeTimeouts::default();
        assert_eq!(timeouts.readiness_timeout, DEFAULT_READINESS_TIMEOUT);
        assert_eq!(timeouts.poll.max_delay, Duration::from_secs(5));
    }
}
