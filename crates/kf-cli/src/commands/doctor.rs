//! `kf doctor` — check that the cluster can run kf.
//!
//! Verifies the App CRD and the service catalog CRDs are installed. The
//! integration tests run the same check once per process before touching the
//! cluster.
//!
//! # Usage
//!
//! ```bash
//! kf doctor
//! ```

use std::io::Write;

use async_trait::async_trait;
use clap::Args;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kf_common::error::Verb;
use kf_common::retry::{retry_with_backoff, RetryConfig};
use kf_common::{APPS_CRD, SERVICE_CATALOG_CRDS};
use kube::api::Api;
use kube::Client;
use tracing::debug;

use super::resolve_kube_client;
use crate::config::KfParams;
use crate::{Error, Result};

/// Check that the cluster can run kf
#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Attempts per check before reporting it as failed
    #[arg(long, default_value_t = 3)]
    pub attempts: u32,
}

/// Looks up CustomResourceDefinitions by name
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrdLookup: Send + Sync {
    /// Returns true if the CRD is installed
    async fn crd_exists(&self, name: &str) -> kf_common::Result<bool>;
}

/// [`CrdLookup`] against the API server
pub struct KubeCrdLookup {
    crds: Api<CustomResourceDefinition>,
}

impl KubeCrdLookup {
    pub fn new(client: Client) -> Self {
        Self {
            crds: Api::all(client),
        }
    }
}

#[async_trait]
impl CrdLookup for KubeCrdLookup {
    async fn crd_exists(&self, name: &str) -> kf_common::Result<bool> {
        match self.crds.get(name).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = kf_common::Error::from_kube(e, Verb::Get, "CustomResourceDefinition", "", name);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Installed,
    Missing,
    Failed(String),
}

/// A named check and its outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
}

/// CRDs kf needs, apps first
pub fn required_crds() -> impl Iterator<Item = &'static str> {
    std::iter::once(APPS_CRD).chain(SERVICE_CATALOG_CRDS.iter().copied())
}

pub async fn run(args: DoctorArgs, params: &KfParams) -> Result<()> {
    let client = resolve_kube_client(params.kubeconfig.as_deref()).await?;
    let lookup = KubeCrdLookup::new(client);
    let checks = diagnose(&lookup, &RetryConfig::with_max_attempts(args.attempts.max(1))).await;
    report(&checks, &mut std::io::stdout())?;
    summarize(&checks)
}

/// Run the cluster checks quietly, failing with the list of problems
pub async fn check_cluster(client: Client) -> Result<()> {
    let checks = diagnose(&KubeCrdLookup::new(client), &RetryConfig::with_max_attempts(3)).await;
    summarize(&checks)
}

/// Run every check, retrying lookups that fail outright.
///
/// A missing CRD is an answer, not a failure, so it is never retried.
pub async fn diagnose(lookup: &dyn CrdLookup, retry: &RetryConfig) -> Vec<Check> {
    let mut checks = Vec::new();
    for name in required_crds() {
        let status = match retry_with_backoff(retry, "crd_exists", || lookup.crd_exists(name)).await {
            Ok(true) => CheckStatus::Installed,
            Ok(false) => CheckStatus::Missing,
            Err(e) => CheckStatus::Failed(e.to_string()),
        };
        debug!(crd = %name, status = ?status, "Checked CRD");
        checks.push(Check {
            name: name.to_string(),
            status,
        });
    }
    checks
}

/// Print one line per check
pub fn report(checks: &[Check], out: &mut impl Write) -> Result<()> {
    writeln!(out, "=== CustomResourceDefinitions ===")?;
    for check in checks {
        match &check.status {
            CheckStatus::Installed => writeln!(out, "  {:<45} OK", check.name)?,
            CheckStatus::Missing => writeln!(out, "  {:<45} MISSING", check.name)?,
            CheckStatus::Failed(e) => writeln!(out, "  {:<45} ERROR: {}", check.name, e)?,
        }
    }
    Ok(())
}

/// Ok when every check passed, otherwise an error naming the failures
pub fn summarize(checks: &[Check]) -> Result<()> {
    let problems: Vec<String> = checks
        .iter()
        .filter_map(|c| match &c.status {
            CheckStatus::Installed => None,
            CheckStatus::Missing => Some(format!("{} is not installed", c.name)),
            CheckStatus::Failed(e) => Some(format!("{} could not be checked: {}", c.name, e)),
        })
        .collect();

    if problems.is_empty() {
        return Ok(());
    }
    Err(Error::command_failed(format!(
        "cluster is not ready for kf: {}",
        problems.join("; ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BINDINGS_CRD: &str = "servicebindings.servicecatalog.k8s.io";

    #[tokio::test]
    async fn healthy_cluster_passes_every_check() {
        let mut lookup = MockCrdLookup::new();
        lookup.expect_crd_exists().times(4).returning(|_| Ok(true));

        let checks = diagnose(&lookup, &RetryConfig::immediate(3)).await;

        assert_eq!(checks.len(), 4);
        assert_eq!(checks[0].name, APPS_CRD);
        assert!(checks.iter().all(|c| c.status == CheckStatus::Installed));
        summarize(&checks).unwrap();
    }

    #[tokio::test]
    async fn missing_crd_is_reported_without_retrying() {
        let mut lookup = MockCrdLookup::new();
        lookup
            .expect_crd_exists()
            .times(4)
            .returning(|name| Ok(name != BINDINGS_CRD));

        let checks = diagnose(&lookup, &RetryConfig::immediate(3)).await;
        let err = summarize(&checks).unwrap_err();

        assert_eq!(
            err.to_string(),
            format!("cluster is not ready for kf: {} is not installed", BINDINGS_CRD)
        );
    }

    #[tokio::test]
    async fn lookup_errors_are_retried_then_reported() {
        let mut lookup = MockCrdLookup::new();
        lookup
            .expect_crd_exists()
            .withf(|name| name == APPS_CRD)
            .times(3)
            .returning(|_| Err(kf_common::Error::validation("connection refused")));
        lookup
            .expect_crd_exists()
            .withf(|name| name != APPS_CRD)
            .returning(|_| Ok(true));

        let checks = diagnose(&lookup, &RetryConfig::immediate(3)).await;

        assert!(matches!(&checks[0].status, CheckStatus::Failed(e) if e.contains("connection refused")));
        assert!(summarize(&checks)
            .unwrap_err()
            .to_string()
            .contains("could not be checked"));
    }

    #[test]
    fn report_prints_one_line_per_check() {
        let checks = vec![
            Check {
                name: APPS_CRD.to_string(),
                status: CheckStatus::Installed,
            },
            Check {
                name: BINDINGS_CRD.to_string(),
                status: CheckStatus::Missing,
            },
        ];
        let mut out = Vec::new();

        report(&checks, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("apps.kf.dev"));
        assert!(text.lines().last().unwrap().ends_with("MISSING"));
    }
}
