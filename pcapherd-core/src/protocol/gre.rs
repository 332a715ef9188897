//! GRE (Generic Routing Encapsulation) layer decoder.
//!
//! RFC 2784: Generic Routing Encapsulation (GRE)
//! RFC 2890: Key and Sequence Number Extensions to GRE

use smallvec::SmallVec;

use super::ethernet::ethertype;
use super::{DecodeContext, Decoded, Decoder, LayerFields, LayerKind};
use crate::error::ProtocolError;
use crate::io::LINKTYPE_ETHERNET;

/// IP protocol number for GRE.
pub const IP_PROTOCOL_GRE: u8 = 47;

/// GRE layer decoder.
#[derive(Debug, Clone, Copy)]
pub struct GreDecoder;

impl Decoder for GreDecoder {
    fn kind(&self) -> LayerKind {
        LayerKind::Gre
    }

    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        match context.hint("ip_protocol") {
            Some(proto) if proto == IP_PROTOCOL_GRE as u64 => Some(100),
            _ => None,
        }
    }

    fn decode(&self, data: &[u8], _context: &DecodeContext) -> Result<Decoded, ProtocolError> {
        // Minimum GRE header is 4 bytes (flags/version + protocol type).
        if data.len() < 4 {
            return Err(ProtocolError::TooShort {
                layer: "gre",
                needed: 4,
                have: data.len(),
            });
        }

        // First 2 bytes: flags and version.
        // Bit 0: checksum present (C), bit 2: key present (K),
        // bit 3: sequence present (S), bits 13-15: version.
        let flags = u16::from_be_bytes([data[0], data[1]]);
        let checksum_present = (flags & 0x8000) != 0;
        let key_present = (flags & 0x2000) != 0;
        let sequence_present = (flags & 0x1000) != 0;
        let version = (flags & 0x0007) as u8;

        // Next 2 bytes: protocol type (EtherType of the payload).
        let protocol = u16::from_be_bytes([data[2], data[3]]);

        let mut header_len = 4usize;
        if checksum_present {
            header_len += 4; // checksum + reserved
        }
        if key_present {
            header_len += 4;
        }
        if sequence_present {
            header_len += 4;
        }
        if data.len() < header_len {
            return Err(ProtocolError::TooShort {
                layer: "gre",
                needed: header_len,
                have: data.len(),
            });
        }

        let mut child_hints = SmallVec::new();
        child_hints.push(("ethertype", protocol as u64));
        // Transparent Ethernet Bridging (NVGRE) carries a full frame.
        if protocol == ethertype::TEB {
            child_hints.push(("link_type", LINKTYPE_ETHERNET as u64));
        }

        Ok(Decoded {
            header_len,
            fields: LayerFields::Gre { protocol, version },
            child_hints,
        })
    }
}
