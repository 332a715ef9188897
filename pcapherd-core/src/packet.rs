//! Packet view over a captured record.
//!
//! A [`Packet`] owns its frame bytes and the ordered protocol layers
//! decoded from them. Queries expose the endpoints the filter engine
//! matches on: the network layer addresses, the transport layer ports, and
//! the position of tunnel layers. Tunnel peeling itself is an explicit
//! decapsulation step in the filter engine; the endpoint queries always
//! answer for the outer packet as decoded.

use std::net::IpAddr;

use bytes::Bytes;

use crate::protocol::{
    decode_chain, ChainStart, DecoderRegistry, Layer, LayerFields, LayerKind,
};

/// Transport protocol of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProto {
    Tcp,
    Udp,
    Sctp,
}

impl std::fmt::Display for TransportProto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportProto::Tcp => write!(f, "tcp"),
            TransportProto::Udp => write!(f, "udp"),
            TransportProto::Sctp => write!(f, "sctp"),
        }
    }
}

/// One transport endpoint: protocol plus port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub proto: TransportProto,
    pub port: u16,
}

impl Endpoint {
    pub fn new(proto: TransportProto, port: u16) -> Self {
        Self { proto, port }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.port, self.proto)
    }
}

/// A decoded packet: owned frame bytes plus ordered layers.
#[derive(Debug, Clone)]
pub struct Packet {
    data: Bytes,
    layers: Vec<Layer>,
}

impl Packet {
    /// Decode a frame from its pcap link type.
    pub fn decode(registry: &DecoderRegistry, link_type: u16, data: Bytes) -> Packet {
        let layers = decode_chain(registry, ChainStart::Link(link_type), &data);
        Packet { data, layers }
    }

    /// Decode bytes known to start at a specific layer, as when re-decoding
    /// a tunnel payload.
    pub fn decode_from(registry: &DecoderRegistry, first: LayerKind, data: Bytes) -> Packet {
        let layers = decode_chain(registry, ChainStart::Layer(first), &data);
        Packet { data, layers }
    }

    /// The owned frame bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Captured frame length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The decoded layers, outermost first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Header bytes of the given layer.
    pub fn layer_header(&self, index: usize) -> &[u8] {
        self.layers[index].header(&self.data)
    }

    /// Payload bytes following the given layer's header.
    pub fn layer_payload(&self, index: usize) -> &[u8] {
        self.layers[index].payload(&self.data)
    }

    /// Source and destination of the first (outer) IP layer, when one
    /// exists.
    pub fn network_endpoints(&self) -> Option<(IpAddr, IpAddr)> {
        self.layers.iter().find_map(|layer| match layer.fields {
            LayerFields::Ipv4 { src, dst, .. } => Some((IpAddr::V4(src), IpAddr::V4(dst))),
            LayerFields::Ipv6 { src, dst, .. } => Some((IpAddr::V6(src), IpAddr::V6(dst))),
            _ => None,
        })
    }

    /// Source and destination endpoints of the first transport layer, when
    /// one exists.
    pub fn transport_endpoints(&self) -> Option<(Endpoint, Endpoint)> {
        self.layers.iter().find_map(|layer| {
            let (proto, src_port, dst_port) = match layer.fields {
                LayerFields::Tcp { src_port, dst_port } => (TransportProto::Tcp, src_port, dst_port),
                LayerFields::Udp { src_port, dst_port } => (TransportProto::Udp, src_port, dst_port),
                LayerFields::Sctp { src_port, dst_port } => {
                    (TransportProto::Sctp, src_port, dst_port)
                }
                _ => return None,
            };
            Some((Endpoint::new(proto, src_port), Endpoint::new(proto, dst_port)))
        })
    }

    /// Position of the outermost tunnel layer (GRE, ERSPAN II or VXLAN).
    /// When several are present the later one wins.
    pub fn tunnel_index(&self) -> Option<usize> {
        let mut found = None;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.kind.is_tunnel() {
                found = Some(i);
            }
        }
        found
    }
}
