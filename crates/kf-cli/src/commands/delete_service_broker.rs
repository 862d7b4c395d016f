//! `kf delete-service-broker` — remove a namespaced service broker.
//!
//! # Usage
//!
//! ```bash
//! kf delete-service-broker mybroker
//! kf dsb mybroker
//! ```

use clap::Args;
use kf_common::crd::ServiceBroker;
use kf_common::LifecycleClient;
use tracing::info;

use super::resolve_kube_client;
use crate::config::KfParams;
use crate::Result;

/// Remove a namespaced service broker from service catalog
#[derive(Args, Debug)]
pub struct DeleteServiceBrokerArgs {
    /// Name of the broker to remove
    #[arg(value_name = "BROKER_NAME")]
    pub broker_name: String,
}

pub async fn run(args: DeleteServiceBrokerArgs, params: &KfParams) -> Result<()> {
    let namespace = params.validate_namespace()?;
    let client = resolve_kube_client(params.kubeconfig.as_deref()).await?;
    let brokers = LifecycleClient::<ServiceBroker>::kube(client);
    delete_service_broker(&brokers, namespace, &args.broker_name).await
}

/// Delete `broker_name` from `namespace`. Any API error, a missing broker
/// included, is returned as is.
pub async fn delete_service_broker(
    brokers: &LifecycleClient<ServiceBroker>,
    namespace: &str,
    broker_name: &str,
) -> Result<()> {
    brokers.delete(namespace, broker_name).await?;
    info!(namespace = %namespace, broker = %broker_name, "Deleted service broker");
    Ok(())
}
