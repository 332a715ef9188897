//! IPv4 layer decoder.

use smallvec::SmallVec;

use etherparse::Ipv4HeaderSlice;

use super::ethernet::ethertype;
use super::{DecodeContext, Decoded, Decoder, LayerFields, LayerKind};
use crate::error::ProtocolError;

/// IPv4 layer decoder.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Decoder;

impl Decoder for Ipv4Decoder {
    fn kind(&self) -> LayerKind {
        LayerKind::Ipv4
    }

    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        if context.first_layer == Some(LayerKind::Ipv4) {
            return Some(100);
        }
        match context.hint("ethertype") {
            Some(et) if et == ethertype::IPV4 as u64 => Some(100),
            _ => None,
        }
    }

    fn decode(&self, data: &[u8], _context: &DecodeContext) -> Result<Decoded, ProtocolError> {
        let header = Ipv4HeaderSlice::from_slice(data).map_err(|e| ProtocolError::InvalidField {
            layer: "ipv4",
            field: "header",
            reason: e.to_string(),
        })?;

        let protocol = header.protocol().0;

        let mut child_hints = SmallVec::new();
        child_hints.push(("ip_protocol", protocol as u64));

        Ok(Decoded {
            header_len: header.slice().len(),
            fields: LayerFields::Ipv4 {
                src: header.source_addr(),
                dst: header.destination_addr(),
                protocol,
                ttl: header.ttl(),
            },
            child_hints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support as ts;
    use std::net::Ipv4Addr;

    #[test]
    fn test_can_decode_by_ethertype() {
        let decoder = Ipv4Decoder;

        let ctx = DecodeContext::new(1);
        assert!(decoder.can_decode(&ctx).is_none());

        let mut ctx = DecodeContext::new(1);
        ctx.parent = Some(LayerKind::Ethernet);
        ctx.insert_hint("ethertype", 0x0800);
        assert_eq!(decoder.can_decode(&ctx), Some(100));

        let mut ctx = DecodeContext::new(1);
        ctx.parent = Some(LayerKind::Ethernet);
        ctx.insert_hint("ethertype", 0x86DD);
        assert!(decoder.can_decode(&ctx).is_none());
    }

    #[test]
    fn test_decode_header_fields() {
        let pkt = ts::ipv4_pkt([10, 1, 1, 1], [8, 8, 8, 8], 6, 57, &[0xAA; 4]);
        let decoder = Ipv4Decoder;

        let decoded = decoder.decode(&pkt, &DecodeContext::new(1)).unwrap();
        assert_eq!(decoded.header_len, 20);
        assert_eq!(
            decoded.fields,
            LayerFields::Ipv4 {
                src: Ipv4Addr::new(10, 1, 1, 1),
                dst: Ipv4Addr::new(8, 8, 8, 8),
                protocol: 6,
                ttl: 57,
            }
        );
        assert_eq!(decoded.child_hints[0], ("ip_protocol", 6));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let decoder = Ipv4Decoder;
        assert!(decoder.decode(&[0x99, 0x00], &DecodeContext::new(1)).is_err());
    }
}
