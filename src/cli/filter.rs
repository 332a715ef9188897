//! `pcapherd filter` - concurrent packet extraction with many PCAPs and
//! many filters.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing::info;

use pcapherd_core::filter::{
    build_matchers, load_filter_config, run_filter_pool, DedupConfig, FilterPoolConfig,
    TaskOptions,
};
use pcapherd_core::CancelToken;

#[derive(Args)]
pub struct FilterArgs {
    /// Filter definitions. Key is the filter name, which also becomes the
    /// output subdirectory; value is a list of conditions.
    #[arg(long, default_value = "filter.yml", env = "PCAPHERD_FILTER_YAML")]
    pub yaml: PathBuf,

    /// Number of PCAP files to be parsed at once
    #[arg(long, default_value_t = 4, env = "PCAPHERD_FILTER_WORKERS")]
    pub workers: usize,

    /// Input folder holding pcap files
    #[arg(long, env = "PCAPHERD_FILTER_INPUT")]
    pub input: PathBuf,

    /// Output folder for filtered pcap files
    #[arg(long, env = "PCAPHERD_FILTER_OUTPUT")]
    pub output: PathBuf,

    /// Find input files with this suffix
    #[arg(long, default_value = "pcap", env = "PCAPHERD_FILTER_SUFFIX")]
    pub suffix: String,

    /// Decapsulate GRE and ERSPAN headers before matching
    #[arg(long, default_value_t = false, env = "PCAPHERD_FILTER_DECAP")]
    pub decap: bool,

    /// Layer scan bound for decapsulation; 0 scans every layer
    #[arg(long = "decap-max-depth", default_value_t = 0)]
    pub decap_max_depth: usize,

    /// Write output packets directly to a gzip stream
    #[arg(long, default_value_t = false, env = "PCAPHERD_FILTER_COMPRESS")]
    pub compress: bool,

    /// Drop duplicate packets within a sliding window
    #[arg(long, default_value_t = false, env = "PCAPHERD_FILTER_DEDUP")]
    pub dedup: bool,

    /// Dedup window bucket count; values below 2 are promoted
    #[arg(long = "dedup-buckets", default_value_t = 3)]
    pub dedup_buckets: usize,

    /// Dedup bucket duration
    #[arg(
        long = "dedup-duration",
        value_parser = humantime::parse_duration,
        default_value = "2s"
    )]
    pub dedup_duration: std::time::Duration,

    /// Path to a MaxMind ASN database. Only needed for asn conditions.
    #[arg(long = "maxmind-asn", env = "PCAPHERD_FILTER_MAXMIND_ASN")]
    pub maxmind_asn: Option<PathBuf>,
}

pub fn run(args: FilterArgs, cancel: &CancelToken) -> anyhow::Result<()> {
    let config = load_filter_config(&args.yaml)
        .with_context(|| format!("reading {}", args.yaml.display()))?;

    let matchers = build_matchers(&config, args.maxmind_asn.as_deref())?;
    for (name, matcher) in &matchers {
        info!(
            filter = name.as_str(),
            conditions = matcher.condition_count(),
            "filter loaded"
        );
    }

    let pool = FilterPoolConfig {
        input_dir: args.input,
        output_dir: args.output,
        suffix: args.suffix,
        workers: args.workers,
        options: TaskOptions {
            decapsulate: args.decap,
            decap_max_depth: args.decap_max_depth,
            compress: args.compress,
            dedup: args.dedup.then_some(DedupConfig {
                buckets: args.dedup_buckets,
                bucket_duration: args.dedup_duration,
            }),
        },
    };
    run_filter_pool(&pool, &matchers, cancel)?;
    Ok(())
}
