//! Decode context and result types.

use smallvec::SmallVec;

use super::LayerKind;
use crate::io::LINKTYPE_ETHERNET;

/// Hint entry for child layer detection: (hint_name, value).
pub type HintEntry = (&'static str, u64);

/// Context passed through the decode chain.
#[derive(Debug, Clone)]
pub struct DecodeContext {
    /// Link type from the PCAP header (e.g., 1 = Ethernet).
    pub link_type: u16,

    /// Explicit first layer for a chain restart, used when re-decoding a
    /// tunnel payload from a known inner layer.
    pub first_layer: Option<LayerKind>,

    /// Layer that identified this one.
    pub parent: Option<LayerKind>,

    /// Layer-specific hints (e.g., ethertype, IP protocol number).
    pub hints: SmallVec<[HintEntry; 4]>,

    /// Offset into the original packet where this layer's data starts.
    pub offset: usize,
}

impl DecodeContext {
    /// Context for a packet with the given link type.
    pub fn new(link_type: u16) -> Self {
        Self {
            link_type,
            first_layer: None,
            parent: None,
            hints: SmallVec::new(),
            offset: 0,
        }
    }

    /// Context that forces the chain to start at a specific layer.
    pub fn starting_at(kind: LayerKind) -> Self {
        Self {
            link_type: LINKTYPE_ETHERNET,
            first_layer: Some(kind),
            parent: None,
            hints: SmallVec::new(),
            offset: 0,
        }
    }

    /// Get a hint value by key (linear search, N is small).
    #[inline]
    pub fn hint(&self, key: &str) -> Option<u64> {
        self.hints.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Insert a hint value.
    #[inline]
    pub fn insert_hint(&mut self, key: &'static str, value: u64) {
        self.hints.push((key, value));
    }

    /// Check if we're at the start of the chain.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Result of decoding one protocol layer.
#[derive(Debug, Clone)]
pub struct Decoded {
    /// Bytes consumed by this layer's header.
    pub header_len: usize,

    /// Typed header fields.
    pub fields: super::LayerFields,

    /// Hints for identifying the next layer. Typically 1-2 entries.
    pub child_hints: SmallVec<[HintEntry; 4]>,
}
