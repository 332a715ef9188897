//! Tunnel decapsulation.
//!
//! Peels the outermost GRE or ERSPAN II layer of a packet: the layer
//! sequence is scanned, the last tunnel layer observed wins, and a new
//! packet is decoded from its payload starting at the layer that followed
//! it. Deeper nesting stays wrapped until the requirement firms up.

use crate::error::{DecapError, Result};
use crate::packet::Packet;
use crate::protocol::{DecoderRegistry, LayerKind};

/// Decapsulate the outermost GRE/ERSPAN II tunnel of `packet`.
///
/// Returns `Ok(None)` when the packet carries no such tunnel - the caller
/// keeps the original. `max_depth > 0` bounds how many layers are
/// scanned. An inner payload that does not decode to a packet with a
/// network layer is a decap error.
pub fn decapsulate(
    registry: &DecoderRegistry,
    packet: &Packet,
    max_depth: usize,
) -> Result<Option<Packet>> {
    let mut tunnel = None;
    for (index, layer) in packet.layers().iter().enumerate() {
        if max_depth > 0 && index + 1 == max_depth {
            break;
        }
        if matches!(layer.kind, LayerKind::Gre | LayerKind::ErspanII) {
            tunnel = Some(index);
        }
    }

    let Some(index) = tunnel else {
        return Ok(None);
    };

    // The inner packet starts at the layer the chain decoded right after
    // the tunnel header.
    let next = packet
        .layers()
        .get(index + 1)
        .ok_or(DecapError::MissingInnerLayer)?;

    let tunnel_layer = &packet.layers()[index];
    let payload_start = tunnel_layer.offset + tunnel_layer.header_len;
    let inner_data = packet.data().slice(payload_start..);

    let inner = Packet::decode_from(registry, next.kind, inner_data);
    if inner.network_endpoints().is_none() {
        return Err(DecapError::NoNetworkLayer.into());
    }
    Ok(Some(inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support as ts;
    use crate::protocol::default_registry;
    use bytes::Bytes;
    use std::net::{IpAddr, Ipv4Addr};

    fn decode(frame: Vec<u8>) -> Packet {
        Packet::decode(&default_registry(), 1, Bytes::from(frame))
    }

    fn gre_wrapped() -> Packet {
        let inner = ts::ipv4_pkt(
            [192, 168, 1, 1],
            [10, 0, 0, 1],
            6,
            64,
            &ts::tcp_seg(40000, 443, b""),
        );
        decode(ts::eth(
            0x0800,
            &ts::ipv4_pkt(
                [100, 64, 0, 1],
                [100, 64, 0, 2],
                47,
                64,
                &ts::gre_hdr(0x0800, &inner),
            ),
        ))
    }

    #[test]
    fn test_untunneled_packet_passes_through() {
        let registry = default_registry();
        let pkt = decode(ts::tcp_frame([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, 64, b""));
        assert!(decapsulate(&registry, &pkt, 0).unwrap().is_none());
    }

    #[test]
    fn test_gre_peel_exposes_inner_tuple() {
        let registry = default_registry();
        let inner = decapsulate(&registry, &gre_wrapped(), 0).unwrap().unwrap();

        let (src, dst) = inner.network_endpoints().unwrap();
        assert_eq!(src, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(dst, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        let (_, dport) = inner.transport_endpoints().unwrap();
        assert_eq!(dport.port, 443);
    }

    #[test]
    fn test_erspan_peel_exposes_mirrored_frame() {
        let registry = default_registry();
        let mirrored = ts::tcp_frame([172, 16, 0, 1], [172, 16, 0, 2], 1111, 2222, 64, b"");
        let pkt = decode(ts::eth(
            0x0800,
            &ts::ipv4_pkt(
                [1, 1, 1, 1],
                [2, 2, 2, 2],
                47,
                64,
                &ts::gre_hdr(0x88BE, &ts::erspan2_hdr(5, &mirrored)),
            ),
        ));

        let inner = decapsulate(&registry, &pkt, 0).unwrap().unwrap();
        let (src, _) = inner.network_endpoints().unwrap();
        assert_eq!(src, IpAddr::V4(Ipv4Addr::new(172, 16, 0, 1)));
    }

    #[test]
    fn test_max_depth_stops_scan() {
        let registry = default_registry();
        // The GRE layer sits at index 2; a depth bound of 2 stops the
        // scan before reaching it.
        let peeled = decapsulate(&registry, &gre_wrapped(), 2).unwrap();
        assert!(peeled.is_none());

        let peeled = decapsulate(&registry, &gre_wrapped(), 4).unwrap();
        assert!(peeled.is_some());
    }

    #[test]
    fn test_vxlan_is_not_peeled_here() {
        // VXLAN is a tunnel for tunnel_index() but not for the GRE/ERSPAN
        // decap step.
        let registry = default_registry();
        let inner = ts::tcp_frame([172, 16, 0, 1], [172, 16, 0, 2], 1, 2, 64, b"");
        let pkt = decode(ts::udp_frame(
            [10, 0, 0, 1],
            [10, 0, 0, 2],
            40000,
            4789,
            64,
            &ts::vxlan_hdr(42, &inner),
        ));

        assert!(pkt.tunnel_index().is_some());
        assert!(decapsulate(&registry, &pkt, 0).unwrap().is_none());
    }

    #[test]
    fn test_inner_without_network_layer_is_decap_error() {
        let registry = default_registry();
        // ERSPAN wrapping an Ethernet frame whose payload is ARP: the
        // inner chain has no IP layer.
        let mirrored = ts::eth(0x0806, &[0u8; 28]);
        let pkt = decode(ts::eth(
            0x0800,
            &ts::ipv4_pkt(
                [1, 1, 1, 1],
                [2, 2, 2, 2],
                47,
                64,
                &ts::gre_hdr(0x88BE, &ts::erspan2_hdr(5, &mirrored)),
            ),
        ));

        let err = decapsulate(&registry, &pkt, 0).unwrap_err();
        assert!(err.to_string().contains("no network layer"));
    }
}
