//! Decoder registry with priority-based selection.

use crate::error::ProtocolError;

use super::{
    DecodeContext, Decoded, ErspanDecoder, EthernetDecoder, GreDecoder, Ipv4Decoder, Ipv6Decoder,
    LayerKind, SctpDecoder, TcpDecoder, UdpDecoder, VxlanDecoder,
};

/// Core trait all layer decoders implement.
pub trait Decoder: Send + Sync {
    /// The layer this decoder produces.
    fn kind(&self) -> LayerKind;

    /// Check if this decoder can handle the given context.
    /// Returns a priority score (higher = more specific match), or `None`
    /// if this decoder cannot handle the context.
    fn can_decode(&self, context: &DecodeContext) -> Option<u32>;

    /// Decode one header from the front of `data`.
    fn decode(&self, data: &[u8], context: &DecodeContext) -> Result<Decoded, ProtocolError>;
}

/// Enum of all built-in decoders.
///
/// This enables static dispatch for the decode hot path - the compiler can
/// inline match arms instead of going through a vtable.
#[derive(Debug, Clone, Copy)]
pub enum BuiltinDecoder {
    Ethernet(EthernetDecoder),
    Ipv4(Ipv4Decoder),
    Ipv6(Ipv6Decoder),
    Tcp(TcpDecoder),
    Udp(UdpDecoder),
    Sctp(SctpDecoder),
    Gre(GreDecoder),
    Erspan(ErspanDecoder),
    Vxlan(VxlanDecoder),
}

/// Macro to delegate Decoder trait methods to inner types.
macro_rules! delegate_decoder {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            BuiltinDecoder::Ethernet(d) => d.$method($($arg),*),
            BuiltinDecoder::Ipv4(d) => d.$method($($arg),*),
            BuiltinDecoder::Ipv6(d) => d.$method($($arg),*),
            BuiltinDecoder::Tcp(d) => d.$method($($arg),*),
            BuiltinDecoder::Udp(d) => d.$method($($arg),*),
            BuiltinDecoder::Sctp(d) => d.$method($($arg),*),
            BuiltinDecoder::Gre(d) => d.$method($($arg),*),
            BuiltinDecoder::Erspan(d) => d.$method($($arg),*),
            BuiltinDecoder::Vxlan(d) => d.$method($($arg),*),
        }
    };
}

impl Decoder for BuiltinDecoder {
    #[inline]
    fn kind(&self) -> LayerKind {
        delegate_decoder!(self, kind)
    }

    #[inline]
    fn can_decode(&self, context: &DecodeContext) -> Option<u32> {
        delegate_decoder!(self, can_decode, context)
    }

    #[inline]
    fn decode(&self, data: &[u8], context: &DecodeContext) -> Result<Decoded, ProtocolError> {
        delegate_decoder!(self, decode, data, context)
    }
}

macro_rules! impl_from_decoder {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for BuiltinDecoder {
                fn from(d: $ty) -> Self {
                    BuiltinDecoder::$variant(d)
                }
            }
        )*
    };
}

impl_from_decoder!(
    EthernetDecoder => Ethernet,
    Ipv4Decoder => Ipv4,
    Ipv6Decoder => Ipv6,
    TcpDecoder => Tcp,
    UdpDecoder => Udp,
    SctpDecoder => Sctp,
    GreDecoder => Gre,
    ErspanDecoder => Erspan,
    VxlanDecoder => Vxlan,
);

/// Registry of layer decoders with priority-based selection.
#[derive(Debug, Clone, Default)]
pub struct DecoderRegistry {
    decoders: Vec<BuiltinDecoder>,
}

impl DecoderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// Register a layer decoder.
    pub fn register<D: Into<BuiltinDecoder>>(&mut self, decoder: D) {
        self.decoders.push(decoder.into());
    }

    /// Find the best decoder for the given context.
    #[inline]
    pub fn find_decoder(&self, context: &DecodeContext) -> Option<&BuiltinDecoder> {
        self.decoders
            .iter()
            .filter_map(|d| d.can_decode(context).map(|priority| (d, priority)))
            .max_by_key(|(_, priority)| *priority)
            .map(|(decoder, _)| decoder)
    }

    /// Get the number of registered decoders.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}
