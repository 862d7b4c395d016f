//! CLI commands

use std::fmt::Display;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::{Error, Result};

pub mod delete_service_broker;
pub mod doctor;
pub mod start;
pub mod stop;
pub mod target;

/// Appended to notices for operations the cluster completes in the background
pub const ASYNC_LOG_SUFFIX: &str = "asynchronously";

/// Extension trait to convert errors with Display to CLI Error::CommandFailed.
///
/// This reduces boilerplate for the common pattern of `.map_err(|e| Error::command_failed(e.to_string()))`.
pub trait CommandErrorExt<T> {
    /// Convert an error to `Error::CommandFailed` using its Display implementation.
    fn cmd_err(self) -> Result<T>;
}

impl<T, E: Display> CommandErrorExt<T> for std::result::Result<T, E> {
    fn cmd_err(self) -> Result<T> {
        self.map_err(|e| Error::command_failed(e.to_string()))
    }
}

/// Build a kube [`Client`].
///
/// Uses `explicit` (the `--kubeconfig` flag or `KF_KUBECONFIG`) when given,
/// otherwise the kube defaults (`KUBECONFIG` env / `~/.kube/config` /
/// in-cluster).
pub async fn resolve_kube_client(explicit: Option<&str>) -> Result<Client> {
    match explicit {
        Some(path) => kube_client_from_path(path).await,
        None => {
            debug!("Using default kubeconfig resolution");
            Client::try_default().await.cmd_err()
        }
    }
}

/// Build a kube [`Client`] from a kubeconfig file path (default context).
pub async fn kube_client_from_path(path: &str) -> Result<Client> {
    let kubeconfig = Kubeconfig::read_from(path)
        .map_err(|e| Error::command_failed(format!("failed to read kubeconfig {}: {}", path, e)))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .cmd_err()?;
    Client::try_from(config).cmd_err()
}
