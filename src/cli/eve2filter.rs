//! `pcapherd eve2filter` - generate filter YAML from EVE alert logs.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing::{error, info};

use pcapherd_core::filter::generate;

#[derive(Args)]
pub struct Eve2FilterArgs {
    /// Path to the EVE JSON log
    #[arg(long = "path-eve", env = "PCAPHERD_EVE2FILTER_PATH_EVE")]
    pub path_eve: PathBuf,

    /// Path for the resulting filter YAML
    #[arg(
        long = "path-filter",
        default_value = "./filter-generated.yaml",
        env = "PCAPHERD_EVE2FILTER_PATH_FILTER"
    )]
    pub path_filter: PathBuf,
}

pub fn run(args: Eve2FilterArgs) -> anyhow::Result<()> {
    let filters = generate(&args.path_eve, |err| {
        error!(error = %err, "skipping unparseable EVE line");
        true
    })
    .with_context(|| format!("scanning {}", args.path_eve.display()))?;
    info!(count = filters.len(), "filters extracted");

    let yaml = serde_yaml::to_string(&filters)?;
    info!(path = %args.path_filter.display(), "writing filters");
    std::fs::write(&args.path_filter, yaml)
        .with_context(|| format!("writing {}", args.path_filter.display()))?;
    Ok(())
}
