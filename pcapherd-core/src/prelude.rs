//! Convenience re-exports for common usage.

pub use crate::cancel::{cancel_pair, CancelToken, Canceller};
pub use crate::error::{Error, Result};
pub use crate::filter::{
    build_matchers, load_filter_config, run_filter_pool, FilterConfig, FilterPoolConfig,
    FilterResult, FilterTask, Matcher, TaskOptions,
};
pub use crate::io::{PcapReader, PcapWriter, Record};
pub use crate::packet::{Endpoint, Packet, TransportProto};
pub use crate::pcapset::{pcap_set_from_dir, MapConfig, PcapMeta, PcapSet};
pub use crate::protocol::{default_registry, DecoderRegistry, LayerKind};
pub use crate::replay::{PcapWireWriter, ReplayConfig, ReplayHandle, WireWriter};
