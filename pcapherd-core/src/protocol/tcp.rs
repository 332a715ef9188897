//! TCP layer decoder.

use smallvec::SmallVec;

use etherparse::TcpHeaderSlice;

use super::{DecodeContext, Decoded, Decoder, LayerFields, LayerKind};
use crate::error::ProtocolError;

/// IP protocol number for TCP.
pub const IP_PROTOCOL_TCP: u8 = 6;

/// TCP layer decoder.
#[derive(Debug, Clone, Copy)]
pub struct TcpDecoder;

impl Decoder for TcpDecoder {
    fn kind(&self) -> LayerKind {
        LayerKind::Tcp
    }

    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        match context.hint("ip_protocol") {
            Some(proto) if proto == IP_PROTOCOL_TCP as u64 => Some(100),
            _ => None,
        }
    }

    fn decode(&self, data: &[u8], _context: &DecodeContext) -> Result<Decoded, ProtocolError> {
        let header = TcpHeaderSlice::from_slice(data).map_err(|e| ProtocolError::InvalidField {
            layer: "tcp",
            field: "header",
            reason: e.to_string(),
        })?;

        Ok(Decoded {
            header_len: header.slice().len(),
            fields: LayerFields::Tcp {
                src_port: header.source_port(),
                dst_port: header.destination_port(),
            },
            child_hints: SmallVec::new(),
        })
    }
}
