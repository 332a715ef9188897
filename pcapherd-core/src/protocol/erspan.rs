//! ERSPAN Type II layer decoder.
//!
//! ERSPAN II rides GRE with protocol type 0x88BE and wraps a mirrored
//! Ethernet frame behind an 8-byte header.
//!
//! draft-foschiano-erspan: Cisco ERSPAN

use smallvec::SmallVec;

use super::ethernet::ethertype;
use super::{DecodeContext, Decoded, Decoder, LayerFields, LayerKind};
use crate::error::ProtocolError;
use crate::io::LINKTYPE_ETHERNET;

/// ERSPAN Type II header length.
const HEADER_LEN: usize = 8;

/// ERSPAN Type II layer decoder.
#[derive(Debug, Clone, Copy)]
pub struct ErspanDecoder;

impl Decoder for ErspanDecoder {
    fn kind(&self) -> LayerKind {
        LayerKind::ErspanII
    }

    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        match context.hint("ethertype") {
            Some(et) if et == ethertype::ERSPAN_II as u64 => Some(110),
            _ => None,
        }
    }

    fn decode(&self, data: &[u8], _context: &DecodeContext) -> Result<Decoded, ProtocolError> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::TooShort {
                layer: "erspan",
                needed: HEADER_LEN,
                have: data.len(),
            });
        }

        // Bytes 0-1: 4-bit version + 12-bit VLAN. Type II is version 1.
        let word = u16::from_be_bytes([data[0], data[1]]);
        let version = (word >> 12) as u8;
        if version != 1 {
            return Err(ProtocolError::InvalidField {
                layer: "erspan",
                field: "version",
                reason: format!("expected type II (version 1), got {}", version),
            });
        }
        let vlan = word & 0x0fff;

        // Bytes 2-3: COS/EN/T + 10-bit session id.
        let session_id = u16::from_be_bytes([data[2], data[3]]) & 0x03ff;

        // The payload is the mirrored Ethernet frame.
        let mut child_hints = SmallVec::new();
        child_hints.push(("link_type", LINKTYPE_ETHERNET as u64));

        Ok(Decoded {
            header_len: HEADER_LEN,
            fields: LayerFields::ErspanII { session_id, vlan },
            child_hints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support as ts;

    fn ctx() -> DecodeContext {
        let mut ctx = DecodeContext::new(1);
        ctx.parent = Some(LayerKind::Gre);
        ctx.insert_hint("ethertype", 0x88BE);
        ctx
    }

    #[test]
    fn test_can_decode_by_gre_protocol_type() {
        let decoder = ErspanDecoder;
        assert!(decoder.can_decode(&DecodeContext::new(1)).is_none());
        assert_eq!(decoder.can_decode(&ctx()), Some(110));
    }

    #[test]
    fn test_decode_session_and_hint() {
        let data = ts::erspan2_hdr(0x015, &[0xFF; 14]);
        let decoded = ErspanDecoder.decode(&data, &ctx()).unwrap();

        assert_eq!(decoded.header_len, 8);
        assert_eq!(
            decoded.fields,
            LayerFields::ErspanII {
                session_id: 0x015,
                vlan: 0,
            }
        );
        assert_eq!(decoded.child_hints[0], ("link_type", 1));
    }

    #[test]
    fn test_rejects_other_versions() {
        // Version nibble 2 (type III).
        let mut data = ts::erspan2_hdr(1, &[]);
        data[0] = 0x20;

        let err = ErspanDecoder.decode(&data, &ctx()).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidField {
                layer: "erspan",
                field: "version",
                ..
            }
        ));
    }

    #[test]
    fn test_too_short() {
        let err = ErspanDecoder.decode(&[0x10, 0x00], &ctx()).unwrap_err();
        assert!(matches!(err, ProtocolError::TooShort { layer: "erspan", .. }));
    }
}
