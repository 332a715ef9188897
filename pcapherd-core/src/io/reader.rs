//! PCAP file reader with automatic compression handling.
//!
//! This module provides [`PcapReader`], which opens a legacy pcap file
//! (raw or gzipped), exposes the capture's snap length and link type, and
//! iterates records until EOF. Parsing is delegated to the `pcap_parser`
//! crate; both endianness variants and the nanosecond-precision magic are
//! honored on read. PCAPNG input is rejected as a bad header.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned};

use crate::error::{Error, PcapError, Result};
use crate::io::{Compression, DecompressReader, Record};

/// Buffer size for the pcap_parser reader. Larger than any record a 64 KiB
/// snap length can produce, so a single refill always makes progress.
const BUFFER_SIZE: usize = 262144;

/// Format of a legacy PCAP file, derived from its magic number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PcapFormat {
    /// Classic PCAP (little-endian, microseconds)
    LeMicro,
    /// Classic PCAP (big-endian, microseconds)
    BeMicro,
    /// Classic PCAP (little-endian, nanoseconds)
    LeNano,
    /// Classic PCAP (big-endian, nanoseconds)
    BeNano,
}

impl PcapFormat {
    /// Detect the PCAP variant from the first four bytes.
    pub fn detect(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::Pcap(PcapError::BadHeader {
                reason: "file too short for pcap magic".into(),
            }));
        }

        let magic = u32::from_ne_bytes([data[0], data[1], data[2], data[3]]);

        match magic {
            0xa1b2c3d4 => Ok(PcapFormat::LeMicro),
            0xd4c3b2a1 => Ok(PcapFormat::BeMicro),
            0xa1b23c4d => Ok(PcapFormat::LeNano),
            0x4d3cb2a1 => Ok(PcapFormat::BeNano),
            0x0a0d0d0a => Err(Error::Pcap(PcapError::BadHeader {
                reason: "pcapng input is not supported".into(),
            })),
            _ => Err(Error::Pcap(PcapError::BadHeader {
                reason: format!("unknown pcap magic: 0x{:08x}", magic),
            })),
        }
    }

    /// Whether record fractions carry nanoseconds instead of microseconds.
    pub fn is_nanosecond(&self) -> bool {
        matches!(self, PcapFormat::LeNano | PcapFormat::BeNano)
    }
}

/// Reader for legacy PCAP files, with optional gzip decompression.
pub struct PcapReader {
    inner: LegacyPcapReader<BufReader<DecompressReader<File>>>,
    format: PcapFormat,
    compression: Compression,
    snaplen: u32,
    link_type: u16,
    frame_number: u64,
}

impl std::fmt::Debug for PcapReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcapReader")
            .field("format", &self.format)
            .field("compression", &self.compression)
            .field("snaplen", &self.snaplen)
            .field("link_type", &self.link_type)
            .field("frame_number", &self.frame_number)
            .finish()
    }
}

impl PcapReader {
    /// Open a PCAP file for reading.
    ///
    /// Compression is detected from the file magic, never from the name.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut file = File::open(path).map_err(|e| PcapError::Open {
            path: path.display().to_string(),
            source: e,
        })?;

        // Sniff compression from the first bytes, then rewind.
        let mut head = [0u8; 2];
        let n = file.read(&mut head).map_err(Error::Io)?;
        let compression = Compression::detect(&head[..n]);
        file.seek(SeekFrom::Start(0)).map_err(Error::Io)?;

        // Peek the pcap magic through a throwaway decoder so format
        // detection sees decompressed bytes.
        let mut probe = DecompressReader::new(file, compression);
        let mut magic = [0u8; 4];
        probe.read_exact(&mut magic).map_err(|e| match compression {
            Compression::Gzip => Error::Pcap(PcapError::Decompression {
                reason: e.to_string(),
            }),
            Compression::None => Error::Pcap(PcapError::BadHeader {
                reason: "file too short for pcap magic".into(),
            }),
        })?;
        let format = PcapFormat::detect(&magic)?;

        // Reopen for a clean stream.
        drop(probe);
        let file = File::open(path).map_err(|e| PcapError::Open {
            path: path.display().to_string(),
            source: e,
        })?;
        let decoder = DecompressReader::new(file, compression);
        let buffered = BufReader::with_capacity(BUFFER_SIZE, decoder);
        let mut inner = LegacyPcapReader::new(BUFFER_SIZE, buffered).map_err(|e| {
            Error::Pcap(PcapError::BadHeader {
                reason: format!("{:?}", e),
            })
        })?;

        // Pull the global header eagerly so snaplen and link type are
        // available before the first record.
        let (snaplen, link_type) = read_global_header(&mut inner, compression)?;

        Ok(PcapReader {
            inner,
            format,
            compression,
            snaplen,
            link_type,
            frame_number: 0,
        })
    }

    /// Snap length declared by the capture's global header.
    #[inline]
    pub fn snaplen(&self) -> u32 {
        self.snaplen
    }

    /// Link type of the capture (e.g., 1 = Ethernet).
    #[inline]
    pub fn link_type(&self) -> u16 {
        self.link_type
    }

    /// Number of records read so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_number
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` at end of file. A short record at EOF surfaces as
    /// [`PcapError::Truncated`] and terminates iteration.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        read_record(
            &mut self.inner,
            self.format,
            self.compression,
            &mut self.frame_number,
        )
    }
}

impl Iterator for PcapReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Consume blocks until the legacy global header has been seen.
fn read_global_header(
    reader: &mut LegacyPcapReader<BufReader<DecompressReader<File>>>,
    compression: Compression,
) -> Result<(u32, u16)> {
    use pcap_parser::PcapError as ParseError;

    let mut stalled = 0u8;
    loop {
        match reader.next() {
            Ok((offset, PcapBlockOwned::LegacyHeader(header))) => {
                let out = (header.snaplen, header.network.0 as u16);
                reader.consume(offset);
                return Ok(out);
            }
            Ok((offset, _)) => {
                reader.consume(offset);
            }
            Err(ParseError::Incomplete) => {
                stalled += 1;
                if stalled > 2 {
                    return Err(Error::Pcap(PcapError::BadHeader {
                        reason: "file too short for pcap global header".into(),
                    }));
                }
                refill(reader, compression)?;
            }
            Err(e) => {
                return Err(Error::Pcap(PcapError::BadHeader {
                    reason: format!("{:?}", e),
                }));
            }
        }
    }
}

/// Read the next record from the underlying block stream.
fn read_record(
    reader: &mut LegacyPcapReader<BufReader<DecompressReader<File>>>,
    format: PcapFormat,
    compression: Compression,
    frame_number: &mut u64,
) -> Result<Option<Record>> {
    use pcap_parser::PcapError as ParseError;

    let mut stalled = 0u8;
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::Legacy(packet) => {
                        *frame_number += 1;

                        let record = Record {
                            ts: record_timestamp(format, packet.ts_sec, packet.ts_usec),
                            captured_len: packet.caplen,
                            original_len: packet.origlen,
                            data: Bytes::copy_from_slice(packet.data),
                        };

                        reader.consume(offset);
                        return Ok(Some(record));
                    }
                    // A second header block mid-stream is tolerated.
                    PcapBlockOwned::LegacyHeader(_) => {
                        reader.consume(offset);
                    }
                    _ => {
                        reader.consume(offset);
                    }
                }
                stalled = 0;
            }
            Err(ParseError::Eof) => return Ok(None),
            Err(ParseError::Incomplete) => {
                // A refill that makes no progress means the stream ended
                // inside a record.
                stalled += 1;
                if stalled > 2 {
                    return Err(Error::Pcap(PcapError::Truncated {
                        frame: *frame_number + 1,
                    }));
                }
                refill(reader, compression)?;
            }
            Err(e) => {
                return Err(Error::Pcap(PcapError::BadHeader {
                    reason: format!("pcap parse error: {:?}", e),
                }));
            }
        }
    }
}

fn refill(
    reader: &mut LegacyPcapReader<BufReader<DecompressReader<File>>>,
    compression: Compression,
) -> Result<()> {
    if let Err(e) = reader.refill() {
        return Err(match compression {
            Compression::Gzip => Error::Pcap(PcapError::Decompression {
                reason: format!("{:?}", e),
            }),
            Compression::None => Error::Pcap(PcapError::BadHeader {
                reason: format!("refill error: {:?}", e),
            }),
        });
    }
    Ok(())
}

/// Convert a record's raw timestamp fields into a UTC timestamp.
fn record_timestamp(format: PcapFormat, ts_sec: u32, ts_frac: u32) -> DateTime<Utc> {
    let nanos = if format.is_nanosecond() {
        ts_frac as i64
    } else {
        ts_frac as i64 * 1000
    };
    // Clamp garbage fractions instead of failing the whole file.
    let nanos = nanos.min(1_999_999_999) as u32;
    DateTime::from_timestamp(ts_sec as i64, nanos).unwrap_or(DateTime::UNIX_EPOCH)
}
