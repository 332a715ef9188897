//! UDP layer decoder.

use smallvec::SmallVec;

use etherparse::UdpHeaderSlice;

use super::{DecodeContext, Decoded, Decoder, LayerFields, LayerKind};
use crate::error::ProtocolError;

/// IP protocol number for UDP.
pub const IP_PROTOCOL_UDP: u8 = 17;

/// UDP layer decoder.
#[derive(Debug, Clone, Copy)]
pub struct UdpDecoder;

impl Decoder for UdpDecoder {
    fn kind(&self) -> LayerKind {
        LayerKind::Udp
    }

    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        match context.hint("ip_protocol") {
            Some(proto) if proto == IP_PROTOCOL_UDP as u64 => Some(100),
            _ => None,
        }
    }

    fn decode(&self, data: &[u8], _context: &DecodeContext) -> Result<Decoded, ProtocolError> {
        let header = UdpHeaderSlice::from_slice(data).map_err(|e| ProtocolError::InvalidField {
            layer: "udp",
            field: "header",
            reason: e.to_string(),
        })?;

        let src_port = header.source_port();
        let dst_port = header.destination_port();

        // Ports let tunnel decoders (VXLAN) claim the payload.
        let mut child_hints = SmallVec::new();
        child_hints.push(("src_port", src_port as u64));
        child_hints.push(("dst_port", dst_port as u64));

        Ok(Decoded {
            header_len: 8,
            fields: LayerFields::Udp { src_port, dst_port },
            child_hints,
        })
    }
}
