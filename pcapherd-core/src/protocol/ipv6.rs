//! IPv6 layer decoder.
//!
//! Extension headers are not walked; the next-header value of the fixed
//! header selects the child layer, which covers the traffic this system
//! filters. Packets with extension headers simply stop the chain at IPv6.

use smallvec::SmallVec;

use etherparse::Ipv6HeaderSlice;

use super::ethernet::ethertype;
use super::{DecodeContext, Decoded, Decoder, LayerFields, LayerKind};
use crate::error::ProtocolError;

/// IPv6 layer decoder.
#[derive(Debug, Clone, Copy)]
pub struct Ipv6Decoder;

impl Decoder for Ipv6Decoder {
    fn kind(&self) -> LayerKind {
        LayerKind::Ipv6
    }

    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        if context.first_layer == Some(LayerKind::Ipv6) {
            return Some(100);
        }
        match context.hint("ethertype") {
            Some(et) if et == ethertype::IPV6 as u64 => Some(100),
            _ => None,
        }
    }

    fn decode(&self, data: &[u8], _context: &DecodeContext) -> Result<Decoded, ProtocolError> {
        let header = Ipv6HeaderSlice::from_slice(data).map_err(|e| ProtocolError::InvalidField {
            layer: "ipv6",
            field: "header",
            reason: e.to_string(),
        })?;

        let next_header = header.next_header().0;

        let mut child_hints = SmallVec::new();
        child_hints.push(("ip_protocol", next_header as u64));

        Ok(Decoded {
            header_len: header.slice().len(),
            fields: LayerFields::Ipv6 {
                src: header.source_addr(),
                dst: header.destination_addr(),
                next_header,
                hop_limit: header.hop_limit(),
            },
            child_hints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support as ts;
    use std::net::Ipv6Addr;

    const SRC: [u8; 16] = [
        0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01,
    ];
    const DST: [u8; 16] = [
        0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x02,
    ];

    #[test]
    fn test_can_decode_by_ethertype() {
        let decoder = Ipv6Decoder;
        let mut ctx = DecodeContext::new(1);
        ctx.parent = Some(LayerKind::Ethernet);
        ctx.insert_hint("ethertype", 0x86DD);
        assert_eq!(decoder.can_decode(&ctx), Some(100));
    }

    #[test]
    fn test_decode_header_fields() {
        let pkt = ts::ipv6_pkt(SRC, DST, 17, 62, &ts::udp_dgram(53, 53, b"q"));
        let decoder = Ipv6Decoder;

        let decoded = decoder.decode(&pkt, &DecodeContext::new(1)).unwrap();
        assert_eq!(decoded.header_len, 40);
        match decoded.fields {
            LayerFields::Ipv6 {
                src,
                dst,
                next_header,
                hop_limit,
            } => {
                assert_eq!(src, Ipv6Addr::from(SRC));
                assert_eq!(dst, Ipv6Addr::from(DST));
                assert_eq!(next_header, 17);
                assert_eq!(hop_limit, 62);
            }
            other => panic!("expected ipv6 fields, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_too_short() {
        let decoder = Ipv6Decoder;
        assert!(decoder
            .decode(&[0x60, 0x00, 0x00], &DecodeContext::new(1))
            .is_err());
    }
}
