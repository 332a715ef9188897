//! `pcapherd map` - parallel metadata mapping of a pcap directory.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use regex::Regex;
use tracing::{error, info, warn};

use pcapherd_core::pcapset::{pcap_set_from_dir, MapConfig};
use pcapherd_core::CancelToken;

#[derive(Args)]
pub struct MapArgs {
    /// Source folder for recursive pcap search
    #[arg(long = "dir-src", env = "PCAPHERD_MAP_DIR_SRC")]
    pub dir_src: PathBuf,

    /// File suffix used for discovery
    #[arg(
        long = "file-suffix",
        default_value = "pcap.gz",
        env = "PCAPHERD_MAP_FILE_SUFFIX"
    )]
    pub file_suffix: String,

    /// Optional file name pattern
    #[arg(long = "file-regexp", env = "PCAPHERD_MAP_FILE_REGEXP")]
    pub file_regexp: Option<String>,

    /// Concurrent scan workers; 0 sizes the pool to the CPU count
    #[arg(
        long = "file-workers",
        default_value_t = 4,
        env = "PCAPHERD_MAP_FILE_WORKERS"
    )]
    pub file_workers: usize,

    /// Output path for the JSON metadata dump
    #[arg(long = "dump-json", env = "PCAPHERD_MAP_DUMP_JSON")]
    pub dump_json: PathBuf,
}

pub fn run(args: MapArgs, cancel: &CancelToken) -> anyhow::Result<()> {
    let pattern = args
        .file_regexp
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid file regexp")?;

    let workers = if args.file_workers < 1 {
        num_cpus::get()
    } else {
        args.file_workers
    };
    info!(workers, "using workers for mapping");

    let config = MapConfig {
        directory: args.dir_src,
        suffix: args.file_suffix,
        pattern,
        workers,
    };
    let mut set = pcap_set_from_dir(&config, cancel)?;

    for file in &set.files {
        match &file.error {
            Some(err) => error!(path = %file.path.display(), error = err.as_str(), "mapping failed"),
            None => info!(
                path = %file.path.display(),
                beginning = %file.period.beginning,
                end = %file.period.end,
                packets = file.counters.packets,
                bytes = file.counters.size,
                "mapped"
            ),
        }
    }

    let removed = set.drop_failed()?;
    if removed > 0 {
        warn!(count = removed, "unable to map files, removing from final dump");
    }

    info!(
        files = set.files.len(),
        beginning = %set.period.beginning,
        end = %set.period.end,
        dump = %args.dump_json.display(),
        "dumping pcap set"
    );
    set.to_json_file(&args.dump_json)
        .context("writing JSON dump")?;
    Ok(())
}
