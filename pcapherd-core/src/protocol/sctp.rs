//! SCTP layer decoder.
//!
//! Only the 12-byte common header is decoded; chunks are not walked. The
//! ports are all the filtering layer needs.
//!
//! RFC 4960: Stream Control Transmission Protocol

use smallvec::SmallVec;

use super::{DecodeContext, Decoded, Decoder, LayerFields, LayerKind};
use crate::error::ProtocolError;

/// IP protocol number for SCTP.
pub const IP_PROTOCOL_SCTP: u8 = 132;

/// SCTP common header length.
const HEADER_LEN: usize = 12;

/// SCTP layer decoder.
#[derive(Debug, Clone, Copy)]
pub struct SctpDecoder;

impl Decoder for SctpDecoder {
    fn kind(&self) -> LayerKind {
        LayerKind::Sctp
    }

    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        match context.hint("ip_protocol") {
            Some(proto) if proto == IP_PROTOCOL_SCTP as u64 => Some(100),
            _ => None,
        }
    }

    fn decode(&self, data: &[u8], _context: &DecodeContext) -> Result<Decoded, ProtocolError> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::TooShort {
                layer: "sctp",
                needed: HEADER_LEN,
                have: data.len(),
            });
        }

        Ok(Decoded {
            header_len: HEADER_LEN,
            fields: LayerFields::Sctp {
                src_port: u16::from_be_bytes([data[0], data[1]]),
                dst_port: u16::from_be_bytes([data[2], data[3]]),
            },
            child_hints: SmallVec::new(),
        })
    }
}
