//! `kf start` — start a staged application.
//!
//! Clears `spec.instances.stopped` on the App. The controller scales the app
//! up in the background, so the command returns as soon as the desired state
//! is written.
//!
//! # Usage
//!
//! ```bash
//! kf start myapp
//! ```

use std::io::Write;

use clap::Args;
use kf_common::crd::App;
use kf_common::LifecycleClient;

use super::{resolve_kube_client, ASYNC_LOG_SUFFIX};
use crate::config::KfParams;
use crate::{Error, Result};

/// Start a staged application
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Name of the app to start
    #[arg(value_name = "APP_NAME")]
    pub app_name: String,
}

pub async fn run(args: StartArgs, params: &KfParams) -> Result<()> {
    let namespace = params.validate_namespace()?;
    let client = resolve_kube_client(params.kubeconfig.as_deref()).await?;
    let apps = LifecycleClient::<App>::kube(client);
    start(&apps, namespace, &args.app_name, &mut std::io::stdout()).await
}

/// Mark `app_name` as started and print the notice to `out`.
pub async fn start(
    apps: &LifecycleClient<App>,
    namespace: &str,
    app_name: &str,
    out: &mut impl Write,
) -> Result<()> {
    apps.mutate(namespace, app_name, |app| {
        app.spec.instances.stopped = false;
        Ok(())
    })
    .await
    .map_err(|e| Error::command_failed(format!("failed to start app: {}", e)))?;

    writeln!(out, "Starting app {:?} {}", app_name, ASYNC_LOG_SUFFIX)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kf_common::fake::FakeStore;
    use kf_common::ConflictPolicy;

    fn stopped(name: &str) -> App {
        let mut app = App::from_image(name, "nginx");
        app.spec.instances.stopped = true;
        app
    }

    #[tokio::test]
    async fn stopped_app_is_started() {
        let store = FakeStore::new();
        store.insert("dev", stopped("myapp"));
        let apps = LifecycleClient::new(store.clone());
        let mut out = Vec::new();

        start(&apps, "dev", "myapp", &mut out).await.unwrap();

        assert!(!store.object("dev", "myapp").unwrap().is_stopped());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Starting app \"myapp\" asynchronously\n"
        );
    }

    #[tokio::test]
    async fn start_survives_a_concurrent_writer() {
        let store = FakeStore::new();
        store.insert("dev", stopped("myapp"));
        store.inject_conflicts(1);
        let apps = LifecycleClient::new(store.clone()).with_policy(ConflictPolicy::immediate(5));

        start(&apps, "dev", "myapp", &mut Vec::new()).await.unwrap();

        assert!(!store.object("dev", "myapp").unwrap().is_stopped());
        assert_eq!(store.replace_attempts(), 2);
    }

    #[tokio::test]
    async fn missing_app_fails_with_context() {
        let apps = LifecycleClient::new(FakeStore::<App>::new());
        let mut out = Vec::new();

        let err = start(&apps, "dev", "ghost", &mut out).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "failed to start app: App \"ghost\" not found in namespace \"dev\""
        );
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn run_requires_a_targeted_space() {
        let err = run(
            StartArgs {
                app_name: "myapp".to_string(),
            },
            &KfParams::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Validation { .. }));
    }
}
