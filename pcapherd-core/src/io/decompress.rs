//! Compression detection and decompression support.
//!
//! Provides a unified [`DecompressReader<R>`] that wraps gzip streams and
//! implements `Read`, using enum dispatch. Compression is detected from file
//! magic, never from the file name, so `.pcap` files that are secretly
//! gzipped still open.

use std::io::{self, Read};

use flate2::read::GzDecoder;

/// Detected compression format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No compression
    None,
    /// Gzip (.gz)
    Gzip,
}

impl Compression {
    /// Detect compression format from magic bytes.
    pub fn detect(data: &[u8]) -> Self {
        match data {
            // Gzip: 1f 8b
            [0x1f, 0x8b, ..] => Compression::Gzip,
            _ => Compression::None,
        }
    }

    /// Check if this represents compressed data.
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Compression::None)
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
        }
    }
}

/// Reader that transparently decompresses based on detected format.
///
/// Uses enum dispatch rather than `Box<dyn Read>` so the hot read path has
/// no virtual call.
pub enum DecompressReader<R: Read> {
    /// Pass-through for uncompressed data
    Plain(R),
    /// Gzip decompression
    Gzip(Box<GzDecoder<R>>),
}

impl<R: Read> DecompressReader<R> {
    /// Wrap `source` according to the detected compression format.
    pub fn new(source: R, compression: Compression) -> Self {
        match compression {
            Compression::None => DecompressReader::Plain(source),
            Compression::Gzip => DecompressReader::Gzip(Box::new(GzDecoder::new(source))),
        }
    }

    /// The compression format this reader was built for.
    pub fn compression(&self) -> Compression {
        match self {
            DecompressReader::Plain(_) => Compression::None,
            DecompressReader::Gzip(_) => Compression::Gzip,
        }
    }
}

impl<R: Read> Read for DecompressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DecompressReader::Plain(r) => r.read(buf),
            DecompressReader::Gzip(r) => r.read(buf),
        }
    }
}
