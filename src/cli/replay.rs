//! `pcapherd replay` - time-aligned replay of a mapped pcap set.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Args;
use regex::Regex;
use tracing::info;

use pcapherd_core::replay::{ReplayConfig, ReplayHandle};
use pcapherd_core::{CancelToken, PcapSet};

use super::parse_arg_timestamp;

#[derive(Args)]
pub struct ReplayArgs {
    /// Network interface to replay to
    #[arg(
        long = "out-interface",
        default_value = "eth0",
        env = "PCAPHERD_REPLAY_OUT_INTERFACE"
    )]
    pub out_interface: String,

    /// JSON metadata dump produced by `map`
    #[arg(long = "dump-json", env = "PCAPHERD_REPLAY_DUMP_JSON")]
    pub dump_json: PathBuf,

    /// BPF filter to exclude some packets on the output handle
    #[arg(long = "out-bpf", env = "PCAPHERD_REPLAY_OUT_BPF")]
    pub out_bpf: Option<String>,

    /// Subset the file list with a name pattern
    #[arg(long = "file-regexp", env = "PCAPHERD_REPLAY_FILE_REGEXP")]
    pub file_regexp: Option<String>,

    /// Speed the replay up or down by a factor of X
    #[arg(long = "time-modifier", default_value_t = 1.0)]
    pub time_modifier: f64,

    /// Scale the replay into a fixed wall-clock window, overriding
    /// --time-modifier. Actual completion drifts naturally with sleep
    /// overhead.
    #[arg(long = "time-scale-enabled", default_value_t = false)]
    pub time_scale_enabled: bool,

    /// Duration for time scaling
    #[arg(
        long = "time-scale-duration",
        value_parser = humantime::parse_duration,
        default_value = "1h"
    )]
    pub time_scale_duration: std::time::Duration,

    /// Start replay from this time (format "2020-09-28 06:00:00")
    #[arg(long = "time-from")]
    pub time_from: Option<String>,

    /// End replay at this time
    #[arg(long = "time-to")]
    pub time_to: Option<String>,

    /// Disable the initial wait before each file read. Useful when files
    /// are part of one logical set but not one capture period.
    #[arg(long = "wait-disable", default_value_t = false)]
    pub wait_disable: bool,

    /// Sort records inside a 100-packet window before pacing
    #[arg(long = "batch-reorder", default_value_t = false)]
    pub batch_reorder: bool,

    /// Drop records whose timestamp went backwards
    #[arg(long = "skip-out-of-order", default_value_t = false)]
    pub skip_out_of_order: bool,

    /// Count and drop frames larger than this; 0 disables the check
    #[arg(long = "skip-mtu", default_value_t = 0)]
    pub skip_mtu: usize,

    /// Iterations over the pcap set
    #[arg(long = "loop-count", default_value_t = 1)]
    pub loop_count: usize,

    /// Loop over the pcap set infinitely, overriding --loop-count
    #[arg(long = "loop-infinite", default_value_t = false)]
    pub loop_infinite: bool,
}

pub fn run(args: ReplayArgs, cancel: &CancelToken) -> anyhow::Result<()> {
    let set = PcapSet::from_json_file(&args.dump_json)
        .with_context(|| format!("loading {}", args.dump_json.display()))?;

    let file_regex = args
        .file_regexp
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid file regexp")?;
    let time_from = args.time_from.as_deref().map(parse_arg_timestamp).transpose()?;
    let time_to = args.time_to.as_deref().map(parse_arg_timestamp).transpose()?;

    if args.loop_infinite {
        info!("infinite loop enabled");
    }

    let mut iteration = 0usize;
    loop {
        iteration += 1;
        if !args.loop_infinite && iteration > args.loop_count {
            if args.loop_count > 1 {
                info!(count = args.loop_count, "max iteration count reached, stopping loop");
            }
            break;
        }
        if cancel.is_cancelled() {
            return Err(pcapherd_core::Error::EarlyExit.into());
        }
        info!(iteration, "starting iteration");

        let handle = ReplayHandle::new(ReplayConfig {
            set: set.clone(),
            write_interface: args.out_interface.clone(),
            file_regex: file_regex.clone(),
            out_bpf: args.out_bpf.clone(),
            disable_wait: args.wait_disable,
            reorder: args.batch_reorder,
            speed_modifier: args.time_modifier,
            scale_duration: args
                .time_scale_enabled
                .then_some(args.time_scale_duration),
            skip_out_of_order: args.skip_out_of_order,
            skip_mtu: args.skip_mtu,
            time_from,
            time_to,
        })?;

        info!(
            beginning = %handle.set().period.beginning,
            end = %handle.set().period.end,
            files = handle.set().files.len(),
            modifier = handle.speed_modifier(),
            "replay set ready"
        );

        let start = Instant::now();
        let stats = handle.play(cancel)?;
        info!(
            iteration,
            took = ?start.elapsed(),
            written = stats.written,
            oversize = stats.oversize,
            "iteration done"
        );
    }
    Ok(())
}
