//! PCAP file I/O: compression-aware opening, record iteration, writing.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;

use crate::error::{Error, PcapError, Result};

pub mod decompress;
pub mod reader;
pub mod writer;

pub use decompress::{Compression, DecompressReader};
pub use reader::{PcapFormat, PcapReader};
pub use writer::{OutputStream, PcapWriter};

/// Link type identifier for Ethernet, the default assumption in this
/// system.
pub const LINKTYPE_ETHERNET: u16 = 1;

/// Snap length cap applied to filter output headers.
pub const MAX_SNAPLEN: u32 = 64 * 1024;

/// One captured packet as stored in a pcap file.
#[derive(Debug, Clone)]
pub struct Record {
    /// Capture timestamp, nanosecond precision.
    pub ts: DateTime<Utc>,
    /// Bytes actually captured.
    pub captured_len: u32,
    /// Original wire length.
    pub original_len: u32,
    /// Captured frame bytes.
    pub data: Bytes,
}

impl Record {
    /// Length of the captured data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the captured data is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Open a file for reading while accounting for compression detected from
/// the file magic.
pub fn open<P: AsRef<Path>>(path: P) -> Result<DecompressReader<File>> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| PcapError::Open {
        path: path.display().to_string(),
        source: e,
    })?;

    let mut head = [0u8; 2];
    let n = file.read(&mut head).map_err(Error::Io)?;
    let compression = Compression::detect(&head[..n]);
    file.seek(SeekFrom::Start(0)).map_err(Error::Io)?;

    Ok(DecompressReader::new(file, compression))
}

/// Compress `source` into `target` with gzip, optionally removing the
/// source afterwards.
pub fn gzip_compress<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    target: Q,
    remove: bool,
) -> Result<()> {
    let mut reader = File::open(source.as_ref()).map_err(Error::Io)?;
    let writer = File::create(target.as_ref()).map_err(Error::Io)?;

    let mut encoder = GzEncoder::new(writer, flate2::Compression::default());
    std::io::copy(&mut reader, &mut encoder).map_err(Error::Io)?;
    let mut out = encoder.finish().map_err(Error::Io)?;
    out.flush().map_err(Error::Io)?;

    if remove {
        std::fs::remove_file(source.as_ref()).map_err(Error::Io)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support;
