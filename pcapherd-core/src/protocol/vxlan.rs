//! VXLAN (Virtual Extensible LAN) layer decoder.
//!
//! RFC 7348: Virtual eXtensible Local Area Network (VXLAN)

use smallvec::SmallVec;

use super::{DecodeContext, Decoded, Decoder, LayerFields, LayerKind};
use crate::error::ProtocolError;
use crate::io::LINKTYPE_ETHERNET;

/// Standard VXLAN UDP destination port.
pub const VXLAN_PORT: u16 = 4789;

/// VXLAN header length.
const HEADER_LEN: usize = 8;

/// VXLAN layer decoder.
#[derive(Debug, Clone, Copy)]
pub struct VxlanDecoder;

impl Decoder for VxlanDecoder {
    fn kind(&self) -> LayerKind {
        LayerKind::Vxlan
    }

    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        match context.hint("dst_port") {
            Some(port) if port == VXLAN_PORT as u64 => Some(100),
            _ => None,
        }
    }

    fn decode(&self, data: &[u8], _context: &DecodeContext) -> Result<Decoded, ProtocolError> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::TooShort {
                layer: "vxlan",
                needed: HEADER_LEN,
                have: data.len(),
            });
        }

        // Bytes 4-6: 24-bit VXLAN network identifier. The I flag (byte 0
        // bit 3) marks the VNI valid; decoding stays lenient either way.
        let vni = ((data[4] as u32) << 16) | ((data[5] as u32) << 8) | (data[6] as u32);

        // VXLAN encapsulates a full Ethernet frame.
        let mut child_hints = SmallVec::new();
        child_hints.push(("link_type", LINKTYPE_ETHERNET as u64));

        Ok(Decoded {
            header_len: HEADER_LEN,
            fields: LayerFields::Vxlan { vni },
            child_hints,
        })
    }
}
