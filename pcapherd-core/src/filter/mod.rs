//! Parallel pcap filtering engine.
//!
//! Given N filter definitions and M input files, a worker pool writes for
//! each (filter, file) pair an output pcap holding only matching packets,
//! optionally decapsulating tunneled traffic and deduplicating via a
//! sliding window first. Tasks travel over a bounded channel whose
//! capacity equals the worker count; workers exit when the channel is
//! drained and closed, or cooperatively on cancellation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select};
use tracing::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::error::{ConfigError, Error, Result};
use crate::io::{OutputStream, PcapReader, PcapWriter, Record, MAX_SNAPLEN};
use crate::packet::Packet;
use crate::pcapset::find_pcap_files;
use crate::protocol::{default_registry, DecoderRegistry};

pub mod config;
pub mod decap;
pub mod dedup;
pub mod generate;
pub mod matcher;

pub use config::{
    example_config, load_filter_config, CombinedConfig, ConditionConfig, FilterConfig,
};
pub use decap::decapsulate;
pub use dedup::{fingerprint, DedupWindow};
pub use generate::{generate, EveEvent};
pub use matcher::{
    build_matchers, AsnDatabase, AsnMatcher, EndpointMatcher, Matcher, SubnetMatcher,
};

/// How often a busy worker reports progress.
const REPORT_INTERVAL: StdDuration = StdDuration::from_secs(5);

/// One unit of work: filter one input file through one matcher.
#[derive(Clone)]
pub struct FilterTask {
    pub input: PathBuf,
    pub output: PathBuf,
    pub matcher: Arc<Matcher>,
    /// Filter name, for logs.
    pub description: String,
}

/// Per-task processing options, shared across the pool.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Peel GRE/ERSPAN II before matching.
    pub decapsulate: bool,
    /// Layer scan bound for decapsulation; 0 scans everything.
    pub decap_max_depth: usize,
    /// Gzip-wrap output files (appends `.gz` to the output name).
    pub compress: bool,
    /// Deduplicate via a sliding window, when configured.
    pub dedup: Option<DedupConfig>,
}

/// Sliding-window dedup parameters.
#[derive(Debug, Clone, Copy)]
pub struct DedupConfig {
    pub buckets: usize,
    pub bucket_duration: StdDuration,
}

/// Counters for one completed (or interrupted) filter task.
#[derive(Debug, Clone)]
pub struct FilterResult {
    pub count: u64,
    pub matched: u64,
    pub skipped: u64,
    pub errors: u64,
    pub decap_errors: u64,
    pub deduplicated: u64,
    pub start: DateTime<Utc>,
    pub elapsed: StdDuration,
    pub rate_pps: f64,
    pub dedup_ratio: f64,
}

impl FilterResult {
    fn new() -> Self {
        FilterResult {
            count: 0,
            matched: 0,
            skipped: 0,
            errors: 0,
            decap_errors: 0,
            deduplicated: 0,
            start: Utc::now(),
            elapsed: StdDuration::ZERO,
            rate_pps: 0.0,
            dedup_ratio: 0.0,
        }
    }

    fn update_rates(&mut self, started: Instant) {
        self.elapsed = started.elapsed();
        let secs = self.elapsed.as_secs_f64();
        self.rate_pps = if secs > 0.0 {
            self.count as f64 / secs
        } else {
            0.0
        };
        self.dedup_ratio = if self.count > 0 {
            (self.deduplicated as f64 / self.count as f64) * 100.0
        } else {
            0.0
        };
    }
}

/// Strip the base name of a compound extension, recursively while a dot
/// remains. Keeps a gz-suffixed input from coming back as
/// `foo.pcap.gz.gz` when reprocessed with compression on.
pub fn extract_base_name<P: AsRef<Path>>(path: P) -> String {
    let mut name = path
        .as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    while let Some(index) = name.rfind('.') {
        name.truncate(index);
    }
    name
}

/// Process one pcap file, writing packets that match the task's filter to
/// the task's output file.
///
/// Counter law: `count == matched + skipped + decap_errors + deduplicated
/// + errors` holds on every return. Cancellation finishes the output
/// stream, keeps the partial file, and returns [`Error::EarlyExit`].
pub fn read_and_filter(
    task: &FilterTask,
    options: &TaskOptions,
    registry: &DecoderRegistry,
    cancel: &CancelToken,
) -> Result<FilterResult> {
    let mut reader = PcapReader::open(&task.input)?;

    let snaplen = match reader.snaplen() {
        0 => MAX_SNAPLEN,
        s => s.min(MAX_SNAPLEN),
    };
    let link_type = reader.link_type();

    let output_path = if options.compress {
        let mut name = task.output.clone().into_os_string();
        name.push(".gz");
        PathBuf::from(name)
    } else {
        task.output.clone()
    };
    let stream = OutputStream::create(&output_path, options.compress)?;
    let mut writer = PcapWriter::new(stream, snaplen, link_type)?;

    let mut dedup = options
        .dedup
        .map(|c| DedupWindow::new(c.buckets, c.bucket_duration));

    let started = Instant::now();
    let mut last_report = started;
    let mut result = FilterResult::new();
    let mut early_exit = false;

    loop {
        if cancel.is_cancelled() {
            early_exit = true;
            break;
        }
        if last_report.elapsed() >= REPORT_INTERVAL {
            result.update_rates(started);
            debug!(
                input = %task.input.display(),
                count = result.count,
                matched = result.matched,
                skipped = result.skipped,
                errors = result.errors,
                decap_errors = result.decap_errors,
                deduplicated = result.deduplicated,
                rate_pps = result.rate_pps,
                dedup_ratio = result.dedup_ratio,
                "filter progress"
            );
            last_report = Instant::now();
        }

        let record = match reader.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => {
                // A sequential reader cannot resync after a bad block;
                // count the record and abort this file only.
                result.count += 1;
                result.errors += 1;
                warn!(input = %task.input.display(), error = %e, "read error, aborting file");
                break;
            }
        };
        result.count += 1;

        let mut packet = Packet::decode(registry, link_type, record.data.clone());
        if options.decapsulate {
            match decapsulate(registry, &packet, options.decap_max_depth) {
                Ok(Some(inner)) => packet = inner,
                Ok(None) => {}
                Err(_) => {
                    result.decap_errors += 1;
                    continue;
                }
            }
        }

        if let Some(window) = dedup.as_mut() {
            if window.drop_packet(&packet) {
                result.deduplicated += 1;
                continue;
            }
        }

        if task.matcher.matches(&packet) {
            // Capture metadata reflects the post-decap length.
            let out = Record {
                ts: record.ts,
                captured_len: packet.len() as u32,
                original_len: packet.len() as u32,
                data: packet.data().clone(),
            };
            writer.write_record(&out)?;
            result.matched += 1;
        } else {
            result.skipped += 1;
        }
    }

    result.update_rates(started);
    writer.into_inner()?.finish()?;

    if early_exit {
        warn!(
            input = %task.input.display(),
            count = result.count,
            matched = result.matched,
            "early exit, partial output kept"
        );
        return Err(Error::EarlyExit);
    }
    Ok(result)
}

/// Driver parameters for a filter pool run.
#[derive(Debug, Clone)]
pub struct FilterPoolConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Input discovery suffix (e.g. "pcap").
    pub suffix: String,
    pub workers: usize,
    pub options: TaskOptions,
}

/// Run every (file, filter) pair through a worker pool.
///
/// Construction errors are fatal before any worker starts; per-task
/// failures are logged and skipped; cancellation drains the pool
/// cooperatively and surfaces as [`Error::EarlyExit`].
pub fn run_filter_pool(
    config: &FilterPoolConfig,
    filters: &BTreeMap<String, Arc<Matcher>>,
    cancel: &CancelToken,
) -> Result<()> {
    if config.workers < 1 {
        return Err(ConfigError::NoWorkers.into());
    }

    let files = find_pcap_files(&config.input_dir, &config.suffix)?;
    info!(
        files = files.len(),
        filters = filters.len(),
        workers = config.workers,
        "starting filter pool"
    );

    // Per-filter output directories exist before any task ships.
    for name in filters.keys() {
        let dir = config.output_dir.join(name);
        match std::fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("output path {} exists and is not a directory", dir.display()),
                )));
            }
            Err(_) => std::fs::create_dir_all(&dir).map_err(Error::Io)?,
        }
    }

    let registry = default_registry();
    let options = &config.options;

    std::thread::scope(|s| {
        let (task_tx, task_rx) = bounded::<FilterTask>(config.workers);

        for id in 0..config.workers {
            let task_rx = task_rx.clone();
            let cancel = cancel.clone();
            let registry = &registry;
            s.spawn(move || {
                info!(worker = id, "filter worker started");
                loop {
                    let task = select! {
                        recv(cancel.receiver()) -> _ => {
                            warn!(worker = id, "early exit called");
                            break;
                        }
                        recv(task_rx) -> task => match task {
                            Ok(task) => task,
                            Err(_) => break,
                        },
                    };

                    info!(
                        worker = id,
                        input = %task.input.display(),
                        output = %task.output.display(),
                        filter = task.description.as_str(),
                        "filtering file"
                    );
                    match read_and_filter(&task, options, registry, &cancel) {
                        Ok(result) => info!(
                            worker = id,
                            count = result.count,
                            matched = result.matched,
                            skipped = result.skipped,
                            errors = result.errors,
                            decap_errors = result.decap_errors,
                            deduplicated = result.deduplicated,
                            rate_pps = result.rate_pps,
                            "file done"
                        ),
                        Err(Error::EarlyExit) => {
                            warn!(worker = id, "early exit called");
                            break;
                        }
                        Err(e) => error!(worker = id, error = %e, "filter task failed"),
                    }
                }
                info!(worker = id, "filter worker done");
            });
        }
        drop(task_rx);

        'feed: for file in &files {
            for (name, matcher) in filters {
                if cancel.is_cancelled() {
                    break 'feed;
                }
                let task = FilterTask {
                    input: file.clone(),
                    output: config
                        .output_dir
                        .join(name)
                        .join(format!("{}.pcap", extract_base_name(file))),
                    matcher: matcher.clone(),
                    description: name.clone(),
                };
                if task_tx.send(task).is_err() {
                    break 'feed;
                }
            }
        }
        drop(task_tx);
    });

    if cancel.is_cancelled() {
        return Err(Error::EarlyExit);
    }
    Ok(())
}
