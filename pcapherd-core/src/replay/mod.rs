//! Time-aligned parallel pcap replay.
//!
//! Every file of a loaded [`PcapSet`] plays concurrently: each worker
//! sleeps its file's delay relative to the set start, then paces records
//! by inter-arrival gap, all divided by a global speed modifier. A single
//! sender task owns the output handle and serializes the interleaved
//! frame stream onto the wire. Within one file, submission order is file
//! order (or timestamp order in reorder mode); across files the sender
//! interleaves as packets arrive, so global order is only approximately
//! time-sorted.

use std::sync::Mutex;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, tick};
use regex::Regex;
use tracing::{error, info, warn};

use crate::cancel::{cancel_pair, CancelToken};
use crate::error::{ConfigError, Error, Result};
use crate::pcapset::PcapSet;

mod wire;
mod worker;

pub use wire::{PcapWireWriter, WireWriter};
pub use worker::DELAY_GRACE;

use worker::{replay_file, WorkerOptions};

/// Frames buffered between file workers and the shared sender.
const SEND_QUEUE: usize = 256;

/// How often the sender logs its progress.
const SENDER_REPORT_INTERVAL: StdDuration = StdDuration::from_secs(5);

/// Configuration for one replay run.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub set: PcapSet,
    /// Interface frames are written to.
    pub write_interface: String,
    /// Subset the file list before playing.
    pub file_regex: Option<Regex>,
    /// BPF expression installed on the output handle.
    pub out_bpf: Option<String>,
    /// Skip the initial per-file delay sleep.
    pub disable_wait: bool,
    /// Sort records inside a 100-packet window before pacing.
    pub reorder: bool,
    /// Explicit speed modifier; must be positive.
    pub speed_modifier: f64,
    /// Scale the whole set into this wall-clock window, overriding
    /// `speed_modifier`.
    pub scale_duration: Option<StdDuration>,
    /// Drop records whose timestamp went backwards.
    pub skip_out_of_order: bool,
    /// Frames larger than this are counted and dropped; 0 disables.
    pub skip_mtu: usize,
    /// Keep only files beginning after this instant.
    pub time_from: Option<DateTime<Utc>>,
    /// Keep only files beginning before this instant.
    pub time_to: Option<DateTime<Utc>>,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig {
            set: PcapSet::default(),
            write_interface: String::new(),
            file_regex: None,
            out_bpf: None,
            disable_wait: false,
            reorder: false,
            speed_modifier: 1.0,
            scale_duration: None,
            skip_out_of_order: false,
            skip_mtu: 0,
            time_from: None,
            time_to: None,
        }
    }
}

/// Counters reported by the shared sender.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplayStats {
    /// Frames written to the interface.
    pub written: u64,
    /// Frames dropped for exceeding `skip_mtu`.
    pub oversize: u64,
}

/// The core object managing replay state.
#[derive(Debug)]
pub struct ReplayHandle {
    set: PcapSet,
    speed_modifier: f64,
    iface: String,
    out_bpf: Option<String>,
    disable_wait: bool,
    skip_out_of_order: bool,
    skip_mtu: usize,
    reorder: bool,
}

impl ReplayHandle {
    /// Pre-flight setup: validate the set, apply file subsetting, derive
    /// the speed modifier and rescale delays when time scaling is on.
    pub fn new(config: ReplayConfig) -> Result<Self> {
        config.set.validate()?;
        if config.speed_modifier <= 0.0 {
            return Err(ConfigError::InvalidSpeedModifier {
                value: config.speed_modifier,
            }
            .into());
        }

        let mut set = config.set;
        if let Some(pattern) = &config.file_regex {
            info!("filtering pcap files");
            set.filter_by_regex(pattern)?;
        }
        if let Some(from) = config.time_from {
            info!(ts = %from, "filtering pcap files to adjust replay beginning");
            set.filter_by_time(from, true)?;
        }
        if let Some(to) = config.time_to {
            info!(ts = %to, "filtering pcap files to adjust replay end");
            set.filter_by_time(to, false)?;
        }
        set.update_delay()?;

        let speed_modifier = match config.scale_duration {
            Some(window) => {
                if window.is_zero() {
                    return Err(ConfigError::ScaleWithoutDuration.into());
                }
                let set_nanos = set.duration().num_nanoseconds().unwrap_or(0).max(0) as f64;
                let modifier = set_nanos / window.as_nanos() as f64;
                if modifier <= 0.0 {
                    return Err(ConfigError::InvalidSpeedModifier { value: modifier }.into());
                }
                // Inter-file offsets shrink with the same factor.
                for file in &mut set.files {
                    let scaled = chrono::Duration::nanoseconds(
                        (file.delay.num_nanoseconds().unwrap_or(0) as f64 / modifier) as i64,
                    );
                    file.set_delay(scaled);
                }
                info!(value = modifier, "scaling enabled, updated speed modifier");
                modifier
            }
            None => config.speed_modifier,
        };

        Ok(ReplayHandle {
            set,
            speed_modifier,
            iface: config.write_interface,
            out_bpf: config.out_bpf,
            disable_wait: config.disable_wait,
            skip_out_of_order: config.skip_out_of_order,
            skip_mtu: config.skip_mtu,
            reorder: config.reorder,
        })
    }

    /// The filtered set this handle will play.
    pub fn set(&self) -> &PcapSet {
        &self.set
    }

    /// The effective speed modifier.
    pub fn speed_modifier(&self) -> f64 {
        self.speed_modifier
    }

    /// Open the configured interface and play the set.
    pub fn play(&self, cancel: &CancelToken) -> Result<ReplayStats> {
        let writer = PcapWireWriter::open(&self.iface, self.out_bpf.as_deref())?;
        self.play_with_writer(writer, cancel)
    }

    /// Play the set into an arbitrary wire writer.
    ///
    /// A cancellable scope wraps all workers: the first worker error
    /// cancels the scope, every worker observes it at its next suspension
    /// point, and the first error is returned. An external interrupt
    /// surfaces as [`Error::EarlyExit`].
    pub fn play_with_writer<W: WireWriter>(
        &self,
        mut writer: W,
        cancel: &CancelToken,
    ) -> Result<ReplayStats> {
        let (scope_canceller, scope_token) = cancel_pair();
        let first_error: Mutex<Option<Error>> = Mutex::new(None);
        let mut stats = ReplayStats::default();

        let options = WorkerOptions {
            speed_modifier: self.speed_modifier,
            disable_wait: self.disable_wait,
            skip_out_of_order: self.skip_out_of_order,
            reorder: self.reorder,
        };
        let skip_mtu = self.skip_mtu;

        std::thread::scope(|s| {
            let (packet_tx, packet_rx) = bounded::<Vec<u8>>(SEND_QUEUE);
            let (done_tx, done_rx) = bounded::<()>(0);

            // Bridge the external interrupt into this play's scope.
            let external = cancel.clone();
            let bridge_canceller = &scope_canceller;
            s.spawn(move || {
                select! {
                    recv(external.receiver()) -> _ => bridge_canceller.cancel(),
                    recv(done_rx) -> _ => {}
                }
            });

            // The single sender owns the wire handle.
            let sender_token = scope_token.clone();
            let sender_canceller = &scope_canceller;
            let sender_error = &first_error;
            let writer_ref = &mut writer;
            let sender = s.spawn(move || {
                let mut local = ReplayStats::default();
                let reporter = tick(SENDER_REPORT_INTERVAL);
                let started = Instant::now();

                loop {
                    select! {
                        recv(sender_token.receiver()) -> _ => break,
                        recv(reporter) -> _ => {
                            let pps = local.written as f64 / started.elapsed().as_secs_f64();
                            info!(
                                written = local.written,
                                oversize = local.oversize,
                                pps = pps as u64,
                                "packets written"
                            );
                        }
                        recv(packet_rx) -> frame => {
                            let Ok(frame) = frame else { break };
                            if skip_mtu > 0 && frame.len() > skip_mtu {
                                local.oversize += 1;
                                continue;
                            }
                            if let Err(e) = writer_ref.write_packet(&frame) {
                                error!(error = %e, "wire write failed");
                                sender_error
                                    .lock()
                                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                                    .get_or_insert(e);
                                sender_canceller.cancel();
                                break;
                            }
                            local.written += 1;
                        }
                    }
                }
                local
            });

            // One worker per file.
            let mut workers = Vec::with_capacity(self.set.files.len());
            for meta in &self.set.files {
                let tx = packet_tx.clone();
                let token = scope_token.clone();
                let canceller = &scope_canceller;
                let error_slot = &first_error;
                workers.push(s.spawn(move || {
                    if let Err(e) = replay_file(meta, options, &tx, &token) {
                        if !e.is_early_exit() {
                            error_slot
                                .lock()
                                .unwrap_or_else(|poisoned| poisoned.into_inner())
                                .get_or_insert(e);
                            canceller.cancel();
                        } else {
                            warn!(pcap = %meta.path.display(), "replay worker early exit");
                        }
                    }
                }));
            }
            drop(packet_tx);

            for handle in workers {
                let _ = handle.join();
            }
            stats = sender.join().unwrap_or_default();
            drop(done_tx);
        });

        if let Some(e) = first_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(Error::EarlyExit);
        }
        Ok(stats)
    }
}
