//! Ethernet II layer decoder.

use smallvec::SmallVec;

use super::{DecodeContext, Decoded, Decoder, LayerFields, LayerKind};
use crate::error::ProtocolError;
use crate::io::LINKTYPE_ETHERNET;

/// Common EtherType values.
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const IPV6: u16 = 0x86DD;
    /// Transparent Ethernet Bridging, seen as GRE payload (NVGRE).
    pub const TEB: u16 = 0x6558;
    /// ERSPAN Type II rides GRE with this protocol type.
    pub const ERSPAN_II: u16 = 0x88BE;
}

/// Ethernet II header length.
const HEADER_LEN: usize = 14;

/// Ethernet layer decoder.
#[derive(Debug, Clone, Copy)]
pub struct EthernetDecoder;

impl Decoder for EthernetDecoder {
    fn kind(&self) -> LayerKind {
        LayerKind::Ethernet
    }

    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        if context.first_layer == Some(LayerKind::Ethernet) {
            return Some(100);
        }
        if context.is_root() && context.first_layer.is_none() {
            // Top of a frame from an Ethernet capture.
            if context.link_type == LINKTYPE_ETHERNET {
                return Some(100);
            }
            return None;
        }
        // Inner frame of an Ethernet-carrying tunnel (VXLAN, ERSPAN, TEB).
        match context.hint("link_type") {
            Some(lt) if lt == LINKTYPE_ETHERNET as u64 => Some(100),
            _ => None,
        }
    }

    fn decode(&self, data: &[u8], _context: &DecodeContext) -> Result<Decoded, ProtocolError> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::TooShort {
                layer: "ethernet",
                needed: HEADER_LEN,
                have: data.len(),
            });
        }

        let ethertype = u16::from_be_bytes([data[12], data[13]]);

        let mut child_hints = SmallVec::new();
        child_hints.push(("ethertype", ethertype as u64));

        Ok(Decoded {
            header_len: HEADER_LEN,
            fields: LayerFields::Ethernet { ethertype },
            child_hints,
        })
    }
}
