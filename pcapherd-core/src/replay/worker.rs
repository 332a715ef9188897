//! Per-file replay workers.
//!
//! One worker plays one mapped pcap file: it sleeps the file's delay
//! relative to the set start, then paces records by their inter-arrival
//! gap divided by the speed modifier, submitting payloads to the shared
//! send channel. Reorder mode buffers a window of records, sorts it by
//! timestamp and emits it with the same pacing rule.

use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{select, Sender};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::io::PcapReader;
use crate::pcapset::PcapMeta;

/// Sleeps shorter than this are skipped; the scheduler cannot honor them
/// anyway.
pub const DELAY_GRACE: StdDuration = StdDuration::from_micros(100);

/// Records buffered per reorder window.
const REORDER_WINDOW: usize = 100;

/// Knobs shared by every file worker of one replay run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerOptions {
    pub speed_modifier: f64,
    pub disable_wait: bool,
    pub skip_out_of_order: bool,
    pub reorder: bool,
}

/// Counters reported by one finished file worker.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct FileStats {
    pub sent: u64,
    pub out_of_order: u64,
}

/// Play one mapped file into the shared send channel.
pub(crate) fn replay_file(
    meta: &PcapMeta,
    options: WorkerOptions,
    tx: &Sender<Vec<u8>>,
    cancel: &CancelToken,
) -> Result<FileStats> {
    let start = Instant::now();
    let delay = meta.delay.to_std().unwrap_or_default();
    let mut estimate = StdDuration::from_secs_f64(
        meta.duration().to_std().unwrap_or_default().as_secs_f64() / options.speed_modifier,
    );
    if !options.disable_wait {
        estimate += delay;
    }

    info!(
        pcap = %meta.path.display(),
        delay = ?delay,
        wait = !options.disable_wait,
        estimate = ?estimate,
        batch_reorder = options.reorder,
        "starting replay worker"
    );

    if !options.disable_wait && !delay.is_zero() {
        if cancel.sleep(delay) {
            return Err(Error::EarlyExit);
        }
        debug!(pcap = %meta.path.display(), "delay done, playing pcap");
    }

    let mut reader = PcapReader::open(&meta.path)?;

    let stats = if options.reorder {
        send_batch_reorder(&mut reader, meta.period.beginning, options, tx, cancel)
    } else {
        send_per_packet(&mut reader, meta.period.beginning, options, tx, cancel)
    }?;

    info!(
        pcap = %meta.path.display(),
        took_actual = ?start.elapsed(),
        took_estimated = ?estimate,
        sent_pkts = stats.sent,
        out_of_order = stats.out_of_order,
        "file replay done"
    );
    Ok(stats)
}

/// Pace and submit records one at a time, in file order.
fn send_per_packet(
    reader: &mut PcapReader,
    file_start: DateTime<Utc>,
    options: WorkerOptions,
    tx: &Sender<Vec<u8>>,
    cancel: &CancelToken,
) -> Result<FileStats> {
    let mut stats = FileStats::default();
    let mut last = file_start;

    while let Some(record) = reader.next_record()? {
        if record.ts < last {
            stats.out_of_order += 1;
            if options.skip_out_of_order {
                continue;
            }
            // Emit immediately, no sleep: the gap would be negative.
        } else {
            let gap = scaled_gap(record.ts - last, options.speed_modifier);
            if gap > DELAY_GRACE && cancel.sleep(gap) {
                return Err(Error::EarlyExit);
            }
        }

        submit(tx, record.data.to_vec(), cancel)?;
        stats.sent += 1;
        last = last.max(record.ts);
    }
    Ok(stats)
}

/// Buffer records into a window, sort by timestamp, emit with the pacing
/// rule, repeat. The final partial window flushes at EOF.
fn send_batch_reorder(
    reader: &mut PcapReader,
    file_start: DateTime<Utc>,
    options: WorkerOptions,
    tx: &Sender<Vec<u8>>,
    cancel: &CancelToken,
) -> Result<FileStats> {
    let mut stats = FileStats::default();
    let mut last = file_start;
    let mut window: Vec<(DateTime<Utc>, Vec<u8>)> = Vec::with_capacity(REORDER_WINDOW);

    while let Some(record) = reader.next_record()? {
        window.push((record.ts, record.data.to_vec()));
        if window.len() == REORDER_WINDOW {
            last = flush_window(&mut window, last, options, tx, cancel, &mut stats)?;
        }
    }
    if !window.is_empty() {
        flush_window(&mut window, last, options, tx, cancel, &mut stats)?;
    }
    Ok(stats)
}

fn flush_window(
    window: &mut Vec<(DateTime<Utc>, Vec<u8>)>,
    mut last: DateTime<Utc>,
    options: WorkerOptions,
    tx: &Sender<Vec<u8>>,
    cancel: &CancelToken,
    stats: &mut FileStats,
) -> Result<DateTime<Utc>> {
    window.sort_by_key(|(ts, _)| *ts);

    for (ts, payload) in window.drain(..) {
        if ts < last {
            // Can only happen across window boundaries; emit immediately.
            stats.out_of_order += 1;
        } else {
            let gap = scaled_gap(ts - last, options.speed_modifier);
            if gap > DELAY_GRACE && cancel.sleep(gap) {
                return Err(Error::EarlyExit);
            }
        }
        submit(tx, payload, cancel)?;
        stats.sent += 1;
        last = last.max(ts);
    }
    Ok(last)
}

/// Blocking channel send that observes cancellation.
fn submit(tx: &Sender<Vec<u8>>, payload: Vec<u8>, cancel: &CancelToken) -> Result<()> {
    select! {
        recv(cancel.receiver()) -> _ => Err(Error::EarlyExit),
        send(tx, payload) -> sent => sent.map_err(|_| Error::EarlyExit),
    }
}

/// Inter-arrival gap divided by the speed modifier.
fn scaled_gap(gap: chrono::Duration, modifier: f64) -> StdDuration {
    let nanos = gap.num_nanoseconds().unwrap_or(0).max(0) as f64;
    StdDuration::from_nanos((nanos / modifier) as u64)
}
