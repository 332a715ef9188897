//! Timestamp-indexed pcap metadata sets.
//!
//! A [`PcapSet`] is the dataset produced by mapping a directory of pcap
//! files: a global capture period plus one [`PcapMeta`] per file, each
//! carrying counters, rates and the `delay` of the file's start relative to
//! the set start. The set is what the replayer loads to time-align parallel
//! file playback.
//!
//! JSON field names are stable: the dump is a long-lived artifact that
//! outlives any single run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Error, Result};

pub mod scan;

pub use scan::{find_pcap_files, pcap_set_from_dir, scan_file, MapConfig};

/// Serialize `chrono::Duration` as integer nanoseconds.
pub(crate) mod duration_nanos {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_nanoseconds().unwrap_or(i64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Duration, D::Error> {
        Ok(Duration::nanoseconds(i64::deserialize(d)?))
    }
}

/// Render a duration the way the dump's `*_human` fields expect.
fn human(d: Duration) -> String {
    humantime::format_duration(d.to_std().unwrap_or_default()).to_string()
}

/// A capture period: first and last timestamp.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Period {
    pub beginning: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    /// Length of the period.
    pub fn duration(&self) -> Duration {
        self.end - self.beginning
    }

    /// Offset of this period's start relative to `target`.
    pub fn delay(&self, target: DateTime<Utc>) -> Duration {
        self.beginning - target
    }
}

impl Default for Period {
    fn default() -> Self {
        Period {
            beginning: DateTime::UNIX_EPOCH,
            end: DateTime::UNIX_EPOCH,
        }
    }
}

/// Per-file packet counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Counters {
    pub packets: u64,
    pub size: u64,
    pub max_packet_size: u64,
    pub out_of_order: u64,
}

impl Counters {
    /// Packets per second over `interval`. Zero-length intervals report
    /// 0.0 so the JSON dump never carries a non-finite number.
    pub fn pps(&self, interval: Duration) -> f64 {
        let secs = interval.num_nanoseconds().unwrap_or(0) as f64 / 1e9;
        if secs <= 0.0 {
            return 0.0;
        }
        self.packets as f64 / secs
    }
}

/// Derived per-file rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rates {
    pub pps: f64,
    #[serde(with = "duration_nanos")]
    pub duration: Duration,
    pub duration_human: String,
}

impl Default for Rates {
    fn default() -> Self {
        Rates {
            pps: 0.0,
            duration: Duration::zero(),
            duration_human: human(Duration::zero()),
        }
    }
}

/// Metadata for one mapped pcap file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcapMeta {
    pub path: PathBuf,
    pub snaplen: u32,
    pub link_type: u16,

    #[serde(flatten)]
    pub period: Period,
    #[serde(flatten)]
    pub counters: Counters,
    #[serde(flatten)]
    pub rates: Rates,

    /// Offset of this file's start relative to the containing set's start.
    /// Zero when the file starts the set.
    #[serde(with = "duration_nanos")]
    pub delay: Duration,
    pub delay_human: String,

    /// Scan failure, when the file was kept but flagged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PcapMeta {
    /// Fresh metadata for a file that has not been scanned yet.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        PcapMeta {
            path: path.into(),
            snaplen: 0,
            link_type: 0,
            period: Period::default(),
            counters: Counters::default(),
            rates: Rates::default(),
            delay: Duration::zero(),
            delay_human: human(Duration::zero()),
            error: None,
        }
    }

    /// Length of this file's capture period.
    pub fn duration(&self) -> Duration {
        self.period.duration()
    }

    /// Recompute the derived rates from period and counters.
    pub fn calculate(&mut self) {
        let duration = self.duration();
        self.rates = Rates {
            duration,
            duration_human: human(duration),
            pps: self.counters.pps(duration),
        };
    }

    pub(crate) fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
        self.delay_human = human(delay);
    }
}

/// A mapped dataset: global period plus per-file metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PcapSet {
    #[serde(flatten)]
    pub period: Period,

    pub files: Vec<PcapMeta>,
}

impl PcapSet {
    /// Build a set from scanned files, deriving period, order and delays.
    pub fn from_files(files: Vec<PcapMeta>) -> Result<Self> {
        let mut set = PcapSet {
            period: Period::default(),
            files,
        };
        set.update_delay()?;
        Ok(set)
    }

    /// Length of the set's global period.
    pub fn duration(&self) -> Duration {
        self.period.duration()
    }

    /// Re-derive global period, file order and per-file delays. Called
    /// after construction and after any set-level filtering.
    pub fn update_delay(&mut self) -> Result<()> {
        if self.files.is_empty() {
            return Err(DatasetError::Empty.into());
        }

        self.files
            .sort_by_key(|f| f.period.beginning);

        let mut beginning = self.files[0].period.beginning;
        let mut end = self.files[0].period.end;
        for f in &self.files {
            if f.period.beginning < beginning {
                beginning = f.period.beginning;
            }
            if f.period.end > end {
                end = f.period.end;
            }
        }
        self.period = Period { beginning, end };

        for f in &mut self.files {
            let delay = f.period.delay(beginning);
            f.set_delay(delay);
        }
        Ok(())
    }

    /// Check the period invariants that a loaded dump must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(DatasetError::Empty.into());
        }
        for f in &self.files {
            if f.counters.packets >= 1 && f.period.beginning > f.period.end {
                return Err(DatasetError::InvalidMeta {
                    path: f.path.display().to_string(),
                    reason: "period start is after period end".into(),
                }
                .into());
            }
            if f.period.beginning < self.period.beginning {
                return Err(DatasetError::InvalidMeta {
                    path: f.path.display().to_string(),
                    reason: format!(
                        "start is before global start {}",
                        self.period.beginning
                    ),
                }
                .into());
            }
            if f.period.end > self.period.end {
                return Err(DatasetError::InvalidMeta {
                    path: f.path.display().to_string(),
                    reason: format!("end is after global end {}", self.period.end),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Remove files whose metadata scan failed. Returns the number removed;
    /// errors when nothing survives.
    pub fn drop_failed(&mut self) -> Result<usize> {
        let before = self.files.len();
        self.files.retain(|f| f.error.is_none());
        let removed = before - self.files.len();
        if self.files.is_empty() {
            return Err(DatasetError::AllFailed.into());
        }
        if removed > 0 {
            self.update_delay()?;
        }
        Ok(removed)
    }

    /// Subset the set by applying a pattern to file names, re-deriving
    /// period and delays.
    pub fn filter_by_regex(&mut self, pattern: &Regex) -> Result<()> {
        self.files
            .retain(|f| pattern.is_match(&f.path.to_string_lossy()));
        if self.files.is_empty() {
            return Err(DatasetError::FilterEmptied.into());
        }
        self.update_delay()
    }

    /// Subset the set by a time boundary: keep files beginning after `ts`
    /// when `beginning` is set, or beginning before `ts` otherwise.
    pub fn filter_by_time(&mut self, ts: DateTime<Utc>, beginning: bool) -> Result<()> {
        if ts > self.period.end || ts < self.period.beginning {
            return Err(DatasetError::OutsidePeriod {
                ts,
                start: self.period.beginning,
                end: self.period.end,
            }
            .into());
        }
        self.files.retain(|f| {
            if beginning {
                f.period.beginning > ts
            } else {
                f.period.beginning < ts
            }
        });
        if self.files.is_empty() {
            return Err(DatasetError::FilterEmptied.into());
        }
        self.update_delay()
    }

    /// Write the set as a JSON dump.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref()).map_err(Error::Io)?;
        serde_json::to_writer(file, self)?;
        Ok(())
    }

    /// Load a set from a JSON dump, checking invariants.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref()).map_err(Error::Io)?;
        let set: PcapSet = serde_json::from_slice(&data)?;
        set.validate()?;
        Ok(set)
    }
}
