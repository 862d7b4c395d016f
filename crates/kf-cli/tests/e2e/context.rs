//! Cluster context for the e2e tests
//!
//! # Environment Variables
//!
//! ```bash
//! KF_E2E_SPACE=integration        # space the tests provision into
//! KF_KUBECONFIG=/path/to/config   # optional, defaults to kube resolution
//! ```

use kf_cli::commands::{doctor, resolve_kube_client};
use kf_common::crd::{App, ServiceBinding, ServiceBroker, ServiceInstance};
use kf_common::LifecycleClient;
use kf_testutil::{
    HarnessError, Orchestrator, PreconditionGate, ScopeTimeouts, ServiceClients, ServiceFixtures,
    ServiceHarness, SpaceKey, TestContext,
};
use kube::Client;

/// Cluster health is checked once for the whole test binary
static CLUSTER_HEALTHY: PreconditionGate = PreconditionGate::new();

const DEFAULT_SPACE: &str = "integration";

/// Everything a test needs to talk to the cluster
pub struct E2eContext {
    pub space: String,
    pub apps: LifecycleClient<App>,
    pub brokers: LifecycleClient<ServiceBroker>,
    pub instances: LifecycleClient<ServiceInstance>,
    pub bindings: LifecycleClient<ServiceBinding>,
    pub harness: ServiceHarness,
}

impl E2eContext {
    /// Root context carrying the space
    pub fn root(&self) -> TestContext {
        TestContext::new().with::<SpaceKey>(self.space.clone())
    }
}

/// Initialize E2E test environment (tracing)
pub fn init_e2e_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Connect to the cluster and pass the precondition gate
pub async fn setup() -> Result<E2eContext, HarnessError> {
    init_e2e_test();

    let kubeconfig = std::env::var("KF_KUBECONFIG").ok();
    let client: Client = resolve_kube_client(kubeconfig.as_deref())
        .await
        .map_err(|e| HarnessError::Precondition {
            message: e.to_string(),
        })?;

    let check_client = client.clone();
    CLUSTER_HEALTHY
        .run(move || doctor::check_cluster(check_client))
        .await?;

    let space = std::env::var("KF_E2E_SPACE").unwrap_or_else(|_| DEFAULT_SPACE.to_string());
    let clients = ServiceClients::kube(client);

    Ok(E2eContext {
        space,
        apps: clients.apps.clone(),
        brokers: clients.brokers.clone(),
        instances: clients.instances.clone(),
        bindings: clients.bindings.clone(),
        harness: ServiceHarness::new(
            Orchestrator::new(ScopeTimeouts::from_env()),
            clients,
            ServiceFixtures::default(),
        ),
    })
}
