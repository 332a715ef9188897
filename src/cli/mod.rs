//! Command-line interface.

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};

pub mod eve2filter;
pub mod example_config;
pub mod filter;
pub mod map;
pub mod replay;
pub mod tar_extract;

/// Timestamp format accepted by `--time-from` / `--time-to`.
const ARG_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a CLI timestamp as UTC.
pub(crate) fn parse_arg_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, ARG_TS_FORMAT).map_err(|_| {
        anyhow::anyhow!(
            "invalid timestamp {}, expected the format \"2020-09-28 06:00:00\"",
            raw
        )
    })?;
    Ok(naive.and_utc())
}

#[derive(Parser)]
#[command(
    name = "pcapherd",
    version,
    about = "Map, replay and filter large pcap corpora while preserving temporal properties"
)]
pub struct Args {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Parse PCAP files for metadata mapping
    Map(map::MapArgs),
    /// Replay a mapped pcap set while preserving temporal properties
    Replay(replay::ReplayArgs),
    /// Concurrent packet extraction with many PCAPs and many filters
    Filter(filter::FilterArgs),
    /// Generate filter YAML from EVE alert events
    Eve2Filter(eve2filter::Eve2FilterArgs),
    /// Extract selected pcap files from a (gzipped) tarball
    TarExtract(tar_extract::TarExtractArgs),
    /// Print an example filter configuration
    ExampleConfig,
    /// Print version information
    Version,
}
