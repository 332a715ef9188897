//! Error types for pcapherd-core.
//!
//! This module provides structured error types for all pcapherd-core
//! operations:
//!
//! - [`enum@Error`] - Main error enum that wraps all error types
//! - [`PcapError`] - Errors from PCAP file reading and writing
//! - [`ProtocolError`] - Errors from protocol layer decoding
//! - [`ConfigError`] - Construction-time errors (invalid CIDR, port, kind...)
//! - [`DatasetError`] - Logic errors on a mapped pcap set
//! - [`DecapError`] - Tunnel decapsulation failures (counted, not fatal)
//!
//! All errors implement `std::error::Error` and can be converted to
//! `anyhow::Error` at the CLI boundary.

use thiserror::Error;

/// Main error type for pcapherd-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading or writing a PCAP file
    #[error("PCAP error: {0}")]
    Pcap(#[from] PcapError),

    /// Error during protocol layer decoding
    #[error("protocol decode error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Invalid user-supplied configuration, fatal at construction
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Logic error on a pcap set (empty set, broken period invariants)
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Tunnel decapsulation failure
    #[error("decap error: {0}")]
    Decap(#[from] DecapError),

    /// Error from the wire writer (live interface handle)
    #[error("wire writer error: {0}")]
    Wire(String),

    /// Cooperative cancellation sentinel. Not a failure: reported as a
    /// warning and does not set a nonzero exit code.
    #[error("early exit")]
    EarlyExit,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether this error is the cooperative cancellation sentinel.
    pub fn is_early_exit(&self) -> bool {
        matches!(self, Error::EarlyExit)
    }
}

/// Errors related to PCAP file reading and writing.
#[derive(Error, Debug)]
pub enum PcapError {
    /// File could not be opened
    #[error("unable to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid or unsupported PCAP global header
    #[error("invalid pcap header: {reason}")]
    BadHeader { reason: String },

    /// Short record at end of file
    #[error("truncated record at frame {frame}")]
    Truncated { frame: u64 },

    /// Compressed stream could not be decoded
    #[error("decompression failed: {reason}")]
    Decompression { reason: String },

    /// Write-side failure
    #[error("pcap write failed: {source}")]
    Write {
        #[source]
        source: std::io::Error,
    },
}

/// Errors related to protocol layer decoding.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Packet too short for protocol header
    #[error("{layer}: packet too short (need {needed} bytes, have {have})")]
    TooShort {
        layer: &'static str,
        needed: usize,
        have: usize,
    },

    /// Invalid header field value
    #[error("{layer}: invalid {field}: {reason}")]
    InvalidField {
        layer: &'static str,
        field: &'static str,
        reason: String,
    },
}

/// Construction-time configuration errors. All of these are fatal before
/// any worker starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid CIDR {value}: {reason}")]
    InvalidCidr { value: String, reason: String },

    #[error("{value} is not a valid port condition, expected <port>/<tcp|udp>")]
    InvalidPort { value: String },

    #[error("invalid AS number: {value}")]
    InvalidAsn { value: String },

    #[error("unsupported condition kind {kind}, use one of subnet, port, asn")]
    UnknownKind { kind: String },

    #[error("no values to parse into {kind} condition")]
    EmptyCondition { kind: &'static str },

    #[error("asn matcher needs a MaxMind ASN database")]
    MissingAsnDatabase,

    #[error("unable to open ASN database {path}: {reason}")]
    AsnDatabase { path: String, reason: String },

    #[error("filter {name} has no conditions")]
    NoConditions { name: String },

    #[error("invalid speed modifier {value}, must be greater than zero")]
    InvalidSpeedModifier { value: f64 },

    #[error("time scaling enabled but scale duration not defined")]
    ScaleWithoutDuration,

    #[error("invalid file regexp: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("worker count should be > 0")]
    NoWorkers,
}

/// Logic errors on a mapped pcap set.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("missing pcap files")]
    Empty,

    #[error("no pcap files were scanned successfully")]
    AllFailed,

    #[error("file filter removed all files")]
    FilterEmptied,

    #[error("{path}: {reason}")]
    InvalidMeta { path: String, reason: String },

    #[error("{ts} is outside set period {start} - {end}")]
    OutsidePeriod {
        ts: chrono::DateTime<chrono::Utc>,
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },
}

/// Tunnel decapsulation failures. Counted per packet, never fatal for the
/// surrounding task.
#[derive(Error, Debug)]
pub enum DecapError {
    /// Tunnel layer found but nothing was decoded after it
    #[error("tunnel layer has no successor layer")]
    MissingInnerLayer,

    /// Peeled payload did not decode to a packet with a network layer
    #[error("inner packet has no network layer")]
    NoNetworkLayer,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_early_exit_detection() {
        assert!(Error::EarlyExit.is_early_exit());
        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert!(!io.is_early_exit());
    }

    #[test]
    fn test_error_display_includes_context() {
        let err = Error::Pcap(PcapError::BadHeader {
            reason: "unknown magic 0xdeadbeef".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("invalid pcap header"));
        assert!(msg.contains("0xdeadbeef"));
    }
}
