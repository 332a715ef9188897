//! Wire output seam.
//!
//! The replayer submits frames through the [`WireWriter`] trait; the
//! production implementation wraps a libpcap live handle opened on the
//! target interface. The seam keeps the timing and ordering machinery
//! testable without a network interface.

use crate::error::{Error, Result};

/// Destination for replayed frames. The handle is exclusively owned by
/// the single sender task.
pub trait WireWriter: Send {
    /// Submit one frame.
    fn write_packet(&mut self, data: &[u8]) -> Result<()>;
}

/// Live libpcap injection handle.
pub struct PcapWireWriter {
    capture: pcap::Capture<pcap::Active>,
}

impl PcapWireWriter {
    /// Open `iface` for injection: snaplen 65536, promiscuous, optional
    /// BPF restriction.
    pub fn open(iface: &str, bpf: Option<&str>) -> Result<Self> {
        let mut capture = pcap::Capture::from_device(iface)
            .map_err(|e| Error::Wire(e.to_string()))?
            .promisc(true)
            .snaplen(65536)
            .open()
            .map_err(|e| Error::Wire(e.to_string()))?;

        if let Some(expr) = bpf {
            capture
                .filter(expr, true)
                .map_err(|e| Error::Wire(e.to_string()))?;
        }
        Ok(PcapWireWriter { capture })
    }
}

impl WireWriter for PcapWireWriter {
    fn write_packet(&mut self, data: &[u8]) -> Result<()> {
        self.capture
            .sendpacket(data)
            .map_err(|e| Error::Wire(e.to_string()))
    }
}
