//! `kf target` — set or show the default space.
//!
//! The space is saved to `~/.kf/config.json` and used whenever neither
//! `--namespace` nor `KF_NAMESPACE` is given.
//!
//! # Usage
//!
//! ```bash
//! # Show the targeted space
//! kf target
//!
//! # Target a space
//! kf target --space dev
//! ```

use std::io::Write;
use std::path::Path;

use clap::Args;
use tracing::info;

use crate::config::{self, KfConfig, KfParams};
use crate::{Error, Result};

/// Set or show the targeted space
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Space to target
    #[arg(long, short = 's')]
    pub space: Option<String>,
}

pub async fn run(args: TargetArgs, params: &KfParams) -> Result<()> {
    let path = config::config_path()?;
    target(&path, args.space.as_deref(), params, &mut std::io::stdout())
}

/// Save `space` to the config at `path`, or print the current target.
pub fn target(
    path: &Path,
    space: Option<&str>,
    params: &KfParams,
    out: &mut impl Write,
) -> Result<()> {
    match space {
        Some(space) => {
            validate_space_name(space)?;
            let mut cfg = config::load_config_from(path)?;
            cfg.space = Some(space.to_string());
            config::save_config_to(path, &cfg)?;
            info!(space = %space, "Saved target");
            writeln!(out, "Targeting space {:?}", space)?;
        }
        None => match params.validate_namespace() {
            Ok(ns) => writeln!(out, "Space: {}", ns)?,
            Err(_) => {
                let cfg: KfConfig = config::load_config_from(path)?;
                match cfg.space {
                    Some(saved) => writeln!(out, "Space: {}", saved)?,
                    None => writeln!(out, "No space targeted")?,
                }
            }
        },
    }
    Ok(())
}

/// Spaces are namespaces, so their names must be DNS-1123 labels.
fn validate_space_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');

    if !valid {
        return Err(Error::validation(format!(
            "invalid space name {:?}: must be at most 63 lowercase alphanumeric characters or '-', \
             starting and ending with an alphanumeric character",
            name
        )));
    }
    Ok(())
}
