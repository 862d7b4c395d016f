//! `kf stop` — stop a running application without deleting it.

use std::io::Write;

use clap::Args;
use kf_common::crd::App;
use kf_common::LifecycleClient;

use super::{resolve_kube_client, ASYNC_LOG_SUFFIX};
use crate::config::KfParams;
use crate::{Error, Result};

/// Stop a running application
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Name of the app to stop
    #[arg(value_name = "APP_NAME")]
    pub app_name: String,
}

pub async fn run(args: StopArgs, params: &KfParams) -> Result<()> {
    let namespace = params.validate_namespace()?;
    let client = resolve_kube_client(params.kubeconfig.as_deref()).await?;
    let apps = LifecycleClient::<App>::kube(client);
    stop(&apps, namespace, &args.app_name, &mut std::io::stdout()).await
}

/// Mark `app_name` as stopped and print the notice to `out`.
pub async fn stop(
    apps: &LifecycleClient<App>,
    namespace: &str,
    app_name: &str,
    out: &mut impl Write,
) -> Result<()> {
    apps.mutate(namespace, app_name, |app| {
        app.spec.instances.stopped = true;
        Ok(())
    })
    .await
    .map_err(|e| Error::command_failed(format!("failed to stop app: {}", e)))?;

    writeln!(out, "Stopping app {:?} {}", app_name, ASYNC_LOG_SUFFIX)?;
    Ok(())
}
