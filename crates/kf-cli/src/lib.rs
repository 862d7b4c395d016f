//! kf CLI library

pub mod commands;
pub mod config;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

use config::KfParams;

/// kf - Cloud Foundry style app platform on Kubernetes
#[derive(Parser, Debug)]
#[command(name = "kf")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Namespace (space) to run the command in
    #[arg(long, short = 'n', global = true, env = "KF_NAMESPACE")]
    pub namespace: Option<String>,

    /// Path to the kubeconfig to use
    #[arg(long, global = true, env = "KF_KUBECONFIG")]
    pub kubeconfig: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a staged application
    Start(commands::start::StartArgs),

    /// Stop a running application
    Stop(commands::stop::StopArgs),

    /// Remove a namespaced service broker from service catalog
    #[command(visible_alias = "dsb")]
    DeleteServiceBroker(commands::delete_service_broker::DeleteServiceBrokerArgs),

    /// Set or show the targeted space
    Target(commands::target::TargetArgs),

    /// Check that the cluster can run kf
    Doctor(commands::doctor::DoctorArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let params = KfParams::resolve(self.namespace, self.kubeconfig, config::config_path)?;

        match self.command {
            Commands::Start(args) => commands::start::run(args, &params).await,
            Commands::Stop(args) => commands::stop::run(args, &params).await,
            Commands::DeleteServiceBroker(args) => {
                commands::delete_service_broker::run(args, &params).await
            }
            Commands::Target(args) => commands::target::run(args, &params).await,
            Commands::Doctor(args) => commands::doctor::run(args, &params).await,
        }
    }
}
