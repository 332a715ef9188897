//! Protocol layer decoding framework.
//!
//! This module provides:
//! - [`Decoder`] trait for implementing layer decoders
//! - [`DecoderRegistry`] for managing registered decoders
//! - Built-in decoders for the layers this system needs
//!
//! ## Supported layers
//!
//! | Layer | Decoders |
//! |-------|----------|
//! | Link | Ethernet |
//! | Network | IPv4, IPv6 |
//! | Transport | TCP, UDP, SCTP |
//! | Tunnel | GRE, ERSPAN Type II, VXLAN |
//!
//! Decoding is a chain: each decoder consumes its header and publishes
//! hints (ethertype, IP protocol, UDP port) that let the registry pick the
//! next decoder. The chain stops when no decoder claims the remaining
//! bytes, when data runs out, or when a header fails to decode - already
//! decoded layers are kept.

use std::net::{Ipv4Addr, Ipv6Addr};

mod context;
mod registry;

// Layer decoders
mod erspan;
mod ethernet;
mod gre;
mod ipv4;
mod ipv6;
mod sctp;
mod tcp;
mod udp;
mod vxlan;

pub use context::{DecodeContext, Decoded, HintEntry};
pub use registry::{BuiltinDecoder, Decoder, DecoderRegistry};

pub use erspan::ErspanDecoder;
pub use ethernet::{ethertype, EthernetDecoder};
pub use gre::{GreDecoder, IP_PROTOCOL_GRE};
pub use ipv4::Ipv4Decoder;
pub use ipv6::Ipv6Decoder;
pub use sctp::{SctpDecoder, IP_PROTOCOL_SCTP};
pub use tcp::TcpDecoder;
pub use udp::UdpDecoder;
pub use vxlan::{VxlanDecoder, VXLAN_PORT};

/// Identity of a decoded protocol layer. A closed set: matching on this
/// tag is the only dispatch the packet queries need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Ethernet,
    Ipv4,
    Ipv6,
    Tcp,
    Udp,
    Sctp,
    Gre,
    ErspanII,
    Vxlan,
}

impl LayerKind {
    /// Stable lower-case name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Ethernet => "ethernet",
            LayerKind::Ipv4 => "ipv4",
            LayerKind::Ipv6 => "ipv6",
            LayerKind::Tcp => "tcp",
            LayerKind::Udp => "udp",
            LayerKind::Sctp => "sctp",
            LayerKind::Gre => "gre",
            LayerKind::ErspanII => "erspan",
            LayerKind::Vxlan => "vxlan",
        }
    }

    /// Whether this is an IP layer.
    pub fn is_network(&self) -> bool {
        matches!(self, LayerKind::Ipv4 | LayerKind::Ipv6)
    }

    /// Whether this is a transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, LayerKind::Tcp | LayerKind::Udp | LayerKind::Sctp)
    }

    /// Whether this layer encapsulates an inner packet.
    pub fn is_tunnel(&self) -> bool {
        matches!(self, LayerKind::Gre | LayerKind::ErspanII | LayerKind::Vxlan)
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed header fields of one decoded layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerFields {
    Ethernet {
        ethertype: u16,
    },
    Ipv4 {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        protocol: u8,
        ttl: u8,
    },
    Ipv6 {
        src: Ipv6Addr,
        dst: Ipv6Addr,
        next_header: u8,
        hop_limit: u8,
    },
    Tcp {
        src_port: u16,
        dst_port: u16,
    },
    Udp {
        src_port: u16,
        dst_port: u16,
    },
    Sctp {
        src_port: u16,
        dst_port: u16,
    },
    Gre {
        protocol: u16,
        version: u8,
    },
    ErspanII {
        session_id: u16,
        vlan: u16,
    },
    Vxlan {
        vni: u32,
    },
}

/// Where a decode chain begins.
#[derive(Debug, Clone, Copy)]
pub enum ChainStart {
    /// Start from a pcap link type (normal top-level decode).
    Link(u16),
    /// Start from a known layer (tunnel payload re-decode).
    Layer(LayerKind),
}

/// One decoded layer within a packet, addressing the packet's byte buffer.
#[derive(Debug, Clone)]
pub struct Layer {
    pub kind: LayerKind,
    /// Start of this layer's header within the packet data.
    pub offset: usize,
    /// Header length in bytes.
    pub header_len: usize,
    /// Typed header fields.
    pub fields: LayerFields,
}

impl Layer {
    /// The header bytes of this layer.
    pub fn header<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset..self.offset + self.header_len]
    }

    /// Everything after this layer's header.
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset + self.header_len..]
    }
}

/// Create a registry with all built-in layer decoders.
pub fn default_registry() -> DecoderRegistry {
    let mut registry = DecoderRegistry::new();

    // Layer 2
    registry.register(EthernetDecoder);

    // Layer 3
    registry.register(Ipv4Decoder);
    registry.register(Ipv6Decoder);

    // Layer 4
    registry.register(TcpDecoder);
    registry.register(UdpDecoder);
    registry.register(SctpDecoder);

    // Tunnels
    registry.register(GreDecoder);
    registry.register(ErspanDecoder);
    registry.register(VxlanDecoder);

    registry
}

/// Decode a packet through all claimed layers.
pub fn decode_chain(registry: &DecoderRegistry, start: ChainStart, data: &[u8]) -> Vec<Layer> {
    let mut layers = Vec::with_capacity(4);
    let mut context = match start {
        ChainStart::Link(link_type) => DecodeContext::new(link_type),
        ChainStart::Layer(kind) => DecodeContext::starting_at(kind),
    };

    let mut remaining = data;
    while !remaining.is_empty() {
        let Some(decoder) = registry.find_decoder(&context) else {
            break;
        };

        match decoder.decode(remaining, &context) {
            Ok(decoded) => {
                layers.push(Layer {
                    kind: decoder.kind(),
                    offset: context.offset,
                    header_len: decoded.header_len,
                    fields: decoded.fields,
                });

                context.parent = Some(decoder.kind());
                context.first_layer = None;
                context.hints = decoded.child_hints;
                context.offset += decoded.header_len;
                remaining = &remaining[decoded.header_len..];
            }
            // A broken header stops the chain; earlier layers stand.
            Err(_) => break,
        }
    }

    layers
}
