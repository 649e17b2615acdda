//! `diode replay`

use clap::Args;
use diode_config::RegistryConfig;
use diode_registry::{Operation, Scenario};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Args)]
pub(crate) struct ReplayArgs {
    /// JSON file holding an operation array or a full scenario object
    file: PathBuf,

    /// Registry config, overriding the one in the scenario
    #[arg(long)]
    config: Option<PathBuf>,
}

pub(crate) fn run(args: ReplayArgs) -> eyre::Result<()> {
    let input = std::fs::read_to_string(&args.file)?;
    let mut scenario = match serde_json::from_str::<Vec<Operation>>(&input) {
        Ok(operations) => Scenario { operations, ..Default::default() },
        Err(_) => Scenario::from_json(&input)?,
    };
    if let Some(path) = &args.config {
        scenario.config = Some(RegistryConfig::load(path)?);
    }

    info!(target: "diode::cli", file = %args.file.display(), operations = scenario.operations.len(), "Replaying");
    let (registry, steps) = scenario.replay()?;

    let mut failed = 0usize;
    for step in &steps {
        if let Some(error) = &step.error {
            failed += 1;
            warn!(target: "diode::cli", index = step.index, op = %step.op, %error, "Operation failed");
        }
        println!("{}", serde_json::to_string(step)?);
    }

    info!(
        target: "diode::cli",
        height = registry.height(),
        applied = steps.len() - failed,
        failed,
        events = registry.events().len(),
        "Replay finished"
    );
    Ok(())
}
