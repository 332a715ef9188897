//! PCAP writer with optional gzip wrapping.
//!
//! The writer emits the classic libpcap format: a 24-byte global header
//! (magic `0xA1B2C3D4`, version 2.4, microsecond timestamps) followed by
//! per-record headers and payloads. Gzip wrapping is decided at open time;
//! [`OutputStream::finish`] flushes the compression layer before the
//! underlying file descriptor closes.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;

use crate::error::{Error, PcapError, Result};
use crate::io::Record;

/// Write-side buffer, matching the Go original's 64 KiB buffered writer.
const WRITE_BUFFER: usize = 65536;

/// Output byte sink for pcap writing: a buffered file, optionally wrapped
/// in a gzip encoder. Enum dispatch keeps the hot path free of vtables.
pub enum OutputStream {
    Plain(BufWriter<File>),
    Gzip(Box<GzEncoder<BufWriter<File>>>),
}

impl OutputStream {
    /// Create the output file. The caller appends `.gz` to the path when
    /// compressing; this only wires up the stream.
    pub fn create<P: AsRef<Path>>(path: P, compress: bool) -> Result<Self> {
        let file = File::create(path.as_ref()).map_err(|e| PcapError::Open {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        let buffered = BufWriter::with_capacity(WRITE_BUFFER, file);
        Ok(if compress {
            OutputStream::Gzip(Box::new(GzEncoder::new(
                buffered,
                flate2::Compression::default(),
            )))
        } else {
            OutputStream::Plain(buffered)
        })
    }

    /// Flush and close the stream, finishing the gzip trailer when present.
    pub fn finish(self) -> Result<()> {
        match self {
            OutputStream::Plain(mut w) => w.flush().map_err(|e| PcapError::Write { source: e })?,
            OutputStream::Gzip(w) => {
                let mut inner = w
                    .finish()
                    .map_err(|e| PcapError::Write { source: e })?;
                inner.flush().map_err(|e| PcapError::Write { source: e })?;
            }
        }
        Ok(())
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputStream::Plain(w) => w.write(buf),
            OutputStream::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputStream::Plain(w) => w.flush(),
            OutputStream::Gzip(w) => w.flush(),
        }
    }
}

/// Writer for legacy PCAP data over any byte sink.
pub struct PcapWriter<W: Write> {
    inner: W,
    records: u64,
}

impl<W: Write> PcapWriter<W> {
    /// Wrap a sink and emit the global header once.
    pub fn new(mut inner: W, snaplen: u32, link_type: u16) -> Result<Self> {
        let mut header = [0u8; 24];
        header[0..4].copy_from_slice(&0xa1b2c3d4u32.to_le_bytes());
        header[4..6].copy_from_slice(&2u16.to_le_bytes()); // version major
        header[6..8].copy_from_slice(&4u16.to_le_bytes()); // version minor
        // thiszone and sigfigs stay zero
        header[16..20].copy_from_slice(&snaplen.to_le_bytes());
        header[20..24].copy_from_slice(&(link_type as u32).to_le_bytes());

        inner
            .write_all(&header)
            .map_err(|e| PcapError::Write { source: e })?;
        Ok(PcapWriter { inner, records: 0 })
    }

    /// Append one record: per-packet header then payload.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        let ts_sec = record.ts.timestamp().max(0) as u32;
        let ts_usec = record.ts.timestamp_subsec_micros();

        let mut header = [0u8; 16];
        header[0..4].copy_from_slice(&ts_sec.to_le_bytes());
        header[4..8].copy_from_slice(&ts_usec.to_le_bytes());
        header[8..12].copy_from_slice(&record.captured_len.to_le_bytes());
        header[12..16].copy_from_slice(&record.original_len.to_le_bytes());

        self.inner
            .write_all(&header)
            .and_then(|_| self.inner.write_all(&record.data))
            .map_err(|e| Error::Pcap(PcapError::Write { source: e }))?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flush buffered bytes and hand back the sink for closing.
    pub fn into_inner(mut self) -> Result<W> {
        self.inner
            .flush()
            .map_err(|e| PcapError::Write { source: e })?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::reader::PcapReader;
    use crate::io::test_support::write_temp;
    use bytes::Bytes;
    use chrono::DateTime;

    fn sample_record(sec: i64, micros: u32, payload: &[u8]) -> Record {
        Record {
            ts: DateTime::from_timestamp(sec, micros * 1000).unwrap(),
            captured_len: payload.len() as u32,
            original_len: payload.len() as u32,
            data: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn test_global_header_layout() {
        let mut out = Vec::new();
        PcapWriter::new(&mut out, 65535, 1).unwrap();

        assert_eq!(out.len(), 24);
        assert_eq!(&out[0..4], &[0xd4, 0xc3, 0xb2, 0xa1]);
        assert_eq!(u16::from_le_bytes([out[4], out[5]]), 2);
        assert_eq!(u16::from_le_bytes([out[6], out[7]]), 4);
        assert_eq!(
            u32::from_le_bytes([out[16], out[17], out[18], out[19]]),
            65535
        );
        assert_eq!(u32::from_le_bytes([out[20], out[21], out[22], out[23]]), 1);
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let payload = [0xAAu8; 14];
        let mut out = Vec::new();
        {
            let mut writer = PcapWriter::new(&mut out, 65535, 1).unwrap();
            writer.write_record(&sample_record(100, 250_000, &payload)).unwrap();
            writer.write_record(&sample_record(101, 0, &payload)).unwrap();
            assert_eq!(writer.records(), 2);
        }

        let file = write_temp(&out);
        let mut reader = PcapReader::open(file.path()).unwrap();
        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(first.ts.timestamp(), 100);
        assert_eq!(first.ts.timestamp_subsec_micros(), 250_000);
        assert_eq!(&first.data[..], &payload[..]);
        assert!(reader.next_record().unwrap().is_some());
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_gzip_output_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pcap.gz");

        let stream = OutputStream::create(&path, true).unwrap();
        let mut writer = PcapWriter::new(stream, 1024, 1).unwrap();
        writer
            .write_record(&sample_record(7, 0, &[0x11u8; 20]))
            .unwrap();
        writer.into_inner().unwrap().finish().unwrap();

        let mut reader = PcapReader::open(&path).unwrap();
        assert_eq!(reader.snaplen(), 1024);
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.captured_len, 20);
        assert!(reader.next_record().unwrap().is_none());
    }
}
