//! `diode config`

use clap::Args;
use diode_config::{NetworkType, RegistryConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Args)]
pub(crate) struct ConfigArgs {
    /// Network preset
    #[arg(long, default_value = "devnet")]
    network: NetworkType,

    /// Write to this file instead of stdout; `.toml` selects TOML, anything else JSON
    #[arg(long)]
    out: Option<PathBuf>,
}

pub(crate) fn run(args: ConfigArgs) -> eyre::Result<()> {
    let config = RegistryConfig::new(args.network);
    match args.out {
        Some(path) => {
            config.save(&path)?;
            info!(target: "diode::cli", network = %args.network, path = %path.display(), "Config written");
        }
        None => print!("{}", config.to_toml()?),
    }
    Ok(())
}
