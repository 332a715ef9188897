//! # pcapherd-core
//!
//! Offline pcap manipulation library: mapping, time-aligned replay and
//! parallel filtering of capture file corpora.
//!
//! This crate holds the whole engine, without any CLI dependencies. It
//! can be used standalone in test harnesses or as the foundation for the
//! `pcapherd` command-line tool.
//!
//! ## Features
//!
//! - **Mapping**: scan a directory of pcap files in parallel into a
//!   timestamp-indexed [`pcapset::PcapSet`] with per-file counters,
//!   rates and replay delays, serialized as JSON
//! - **Replay**: play every file of a set concurrently to a network
//!   interface, preserving inter-file offsets and intra-packet spacing
//!   modulo a speed modifier
//! - **Filtering**: run pcap corpora through composable matchers
//!   (subnet, port, ASN) on a worker pool, with GRE/ERSPAN II
//!   decapsulation and sliding-window deduplication
//! - **Pcap I/O**: legacy pcap reading and writing with transparent gzip
//!   handling either way
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use pcapherd_core::prelude::*;
//!
//! // Map a directory into a dataset.
//! let config = MapConfig {
//!     directory: "/mnt/pcap".into(),
//!     suffix: "pcap.gz".into(),
//!     pattern: None,
//!     workers: 4,
//! };
//! let set = pcap_set_from_dir(&config, &CancelToken::never()).unwrap();
//! set.to_json_file("/mnt/pcap/meta.json").unwrap();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                          pcapherd-core                             |
//! +--------------------------------------------------------------------+
//! |  io/       - pcap reader/writer, gzip detection and wrapping       |
//! |  protocol/ - Decoder trait, registry, 9 layer decoders             |
//! |  packet    - Packet view: layers, endpoints, tunnel position       |
//! |  pcapset/  - PcapSet dataset, parallel directory mapping           |
//! |  replay/   - time-aligned parallel replay, wire writer seam        |
//! |  filter/   - matcher algebra, dedup window, decap, worker pool     |
//! |  cancel    - cooperative cancellation tokens                       |
//! |  error     - error types                                           |
//! +--------------------------------------------------------------------+
//! ```

pub mod cancel;
pub mod error;
pub mod filter;
pub mod io;
pub mod packet;
pub mod pcapset;
pub mod prelude;
pub mod protocol;
pub mod replay;

// Re-export commonly used types at crate root for convenience
pub use cancel::{cancel_pair, CancelToken, Canceller};
pub use error::{ConfigError, DatasetError, DecapError, Error, PcapError, ProtocolError, Result};
pub use io::{PcapReader, PcapWriter, Record};
pub use packet::{Endpoint, Packet, TransportProto};
pub use pcapset::{MapConfig, PcapMeta, PcapSet};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
