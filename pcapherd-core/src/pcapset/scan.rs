//! Parallel metadata scan over a directory of pcap files.
//!
//! Discovery walks the root recursively and keeps files matching a name
//! suffix and an optional regex. A fixed worker pool pulls paths from a
//! channel, scans each file sequentially (first/last timestamp, packet and
//! byte counts, max packet size, out-of-order count) and pushes results to
//! a completion channel; aggregation runs after the workers drain.
//!
//! A single unreadable file never aborts the job - it surfaces as a
//! per-file error on its [`PcapMeta`]. An unreadable root is fatal.

use std::path::{Path, PathBuf};

use crossbeam_channel::bounded;
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::error::{ConfigError, Error, Result};
use crate::io::PcapReader;
use crate::pcapset::{PcapMeta, PcapSet};

/// Parameters for a mapping run.
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Root directory for the recursive pcap search.
    pub directory: PathBuf,
    /// File name suffix to keep (e.g. "pcap" or "pcap.gz").
    pub suffix: String,
    /// Optional file name pattern.
    pub pattern: Option<Regex>,
    /// Worker pool size.
    pub workers: usize,
}

/// Recursively walk `dir`, collecting files whose names end with `suffix`.
pub fn find_pcap_files<P: AsRef<Path>>(dir: P, suffix: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir.as_ref()) {
        let entry = entry.map_err(|e| {
            Error::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "directory walk failed")
            }))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().to_string_lossy().ends_with(suffix) {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

/// Scan one pcap file for metadata.
///
/// The first record pins `period.beginning`; every record updates the
/// counters; a record whose timestamp does not advance past the running
/// maximum counts as out-of-order. `period.end` is the maximum timestamp
/// seen.
pub fn scan_file<P: AsRef<Path>>(path: P) -> Result<PcapMeta> {
    let mut meta = PcapMeta::new(path.as_ref());

    let mut reader = PcapReader::open(path.as_ref())?;
    meta.snaplen = reader.snaplen();
    meta.link_type = reader.link_type();

    let first = reader
        .next_record()?
        .ok_or_else(|| Error::Pcap(crate::error::PcapError::BadHeader {
            reason: "pcap file holds no records".into(),
        }))?;

    meta.period.beginning = first.ts;
    meta.counters.packets = 1;
    meta.counters.size = first.captured_len as u64;
    meta.counters.max_packet_size = first.captured_len as u64;
    let mut last = first.ts;

    while let Some(record) = reader.next_record()? {
        meta.counters.packets += 1;
        meta.counters.size += record.captured_len as u64;
        if record.captured_len as u64 > meta.counters.max_packet_size {
            meta.counters.max_packet_size = record.captured_len as u64;
        }
        if record.ts <= last {
            meta.counters.out_of_order += 1;
        } else {
            last = record.ts;
        }
    }

    meta.period.end = last;
    meta.calculate();
    Ok(meta)
}

/// Map a directory into a [`PcapSet`] using a fixed worker pool.
pub fn pcap_set_from_dir(config: &MapConfig, cancel: &CancelToken) -> Result<PcapSet> {
    if config.workers < 1 {
        return Err(ConfigError::NoWorkers.into());
    }

    let files = find_pcap_files(&config.directory, &config.suffix)?;
    info!(
        count = files.len(),
        dir = %config.directory.display(),
        "discovered pcap files"
    );

    let mut scanned: Vec<PcapMeta> = Vec::with_capacity(files.len());

    std::thread::scope(|s| {
        let (task_tx, task_rx) = bounded::<PathBuf>(config.workers);
        let (done_tx, done_rx) = bounded::<PcapMeta>(config.workers);

        for id in 0..config.workers {
            let task_rx = task_rx.clone();
            let done_tx = done_tx.clone();
            let cancel = cancel.clone();
            s.spawn(move || {
                debug!(worker = id, "mapper started");
                for path in task_rx {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let start = std::time::Instant::now();
                    let meta = match scan_file(&path) {
                        Ok(meta) => {
                            debug!(
                                worker = id,
                                path = %path.display(),
                                took = ?start.elapsed(),
                                "file mapped"
                            );
                            meta
                        }
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "scan failed");
                            let mut meta = PcapMeta::new(&path);
                            meta.error = Some(e.to_string());
                            meta
                        }
                    };
                    if done_tx.send(meta).is_err() {
                        break;
                    }
                }
                debug!(worker = id, "mapper stopped");
            });
        }
        drop(task_rx);
        drop(done_tx);

        let pattern = config.pattern.clone();
        let cancel_feed = cancel.clone();
        s.spawn(move || {
            for path in files {
                if cancel_feed.is_cancelled() {
                    break;
                }
                if let Some(re) = &pattern {
                    if !re.is_match(&path.to_string_lossy()) {
                        continue;
                    }
                }
                if task_tx.send(path).is_err() {
                    break;
                }
            }
            // Dropping the sender closes the channel and drains the pool.
        });

        for meta in done_rx {
            scanned.push(meta);
        }
    });

    if cancel.is_cancelled() {
        return Err(Error::EarlyExit);
    }

    PcapSet::from_files(scanned)
}
