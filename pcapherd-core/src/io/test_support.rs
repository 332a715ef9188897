//! Shared byte-level builders for tests: pcap files and packet frames.

use tempfile::NamedTempFile;

/// One record destined for a generated pcap file.
pub struct TestRecord {
    pub ts_sec: u32,
    pub ts_usec: u32,
    pub data: Vec<u8>,
}

/// A record holding a minimal Ethernet frame padded to `len` bytes.
pub fn record_at(ts_sec: u32, ts_usec: u32, len: usize) -> TestRecord {
    let mut data = eth(0x0800, &[]);
    data.resize(len.max(14), 0);
    TestRecord {
        ts_sec,
        ts_usec,
        data,
    }
}

/// A record carrying caller-provided frame bytes.
pub fn record_with(ts_sec: u32, ts_usec: u32, data: Vec<u8>) -> TestRecord {
    TestRecord {
        ts_sec,
        ts_usec,
        data,
    }
}

/// Serialize records into a classic little-endian microsecond pcap image
/// (snaplen 65535, Ethernet link type).
pub fn pcap_bytes(records: &[TestRecord]) -> Vec<u8> {
    let mut data = Vec::new();

    data.extend_from_slice(&[0xd4, 0xc3, 0xb2, 0xa1]); // magic (LE)
    data.extend_from_slice(&[0x02, 0x00]); // version major
    data.extend_from_slice(&[0x04, 0x00]); // version minor
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // thiszone
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // sigfigs
    data.extend_from_slice(&[0xff, 0xff, 0x00, 0x00]); // snaplen 65535
    data.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]); // network (Ethernet)

    for record in records {
        let len = record.data.len() as u32;
        data.extend_from_slice(&record.ts_sec.to_le_bytes());
        data.extend_from_slice(&record.ts_usec.to_le_bytes());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&record.data);
    }

    data
}

/// Persist raw bytes into a temporary file.
pub fn write_temp(data: &[u8]) -> NamedTempFile {
    let file = NamedTempFile::with_suffix(".pcap").unwrap();
    std::fs::write(file.path(), data).unwrap();
    file
}

/// Build a pcap file from records and persist it.
pub fn write_pcap(records: &[TestRecord]) -> NamedTempFile {
    write_temp(&pcap_bytes(records))
}

/// Ethernet frame with fixed MACs.
pub fn eth(ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(14 + payload.len());
    frame.extend_from_slice(&[0xbd, 0xbd, 0xbd, 0xbd, 0xbd, 0xbd]); // dst
    frame.extend_from_slice(&[0xff, 0xaa, 0xfa, 0xaa, 0xff, 0xaa]); // src
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// RFC 1071 checksum over an IPv4 header image.
pub fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;
    while i + 1 < header.len() {
        sum += u16::from_be_bytes([header[i], header[i + 1]]) as u32;
        i += 2;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !sum as u16
}

/// IPv4 header (no options) followed by payload.
pub fn ipv4_pkt(src: [u8; 4], dst: [u8; 4], protocol: u8, ttl: u8, payload: &[u8]) -> Vec<u8> {
    let total_len = (20 + payload.len()) as u16;
    let mut header = vec![
        0x45, 0x00, // version/ihl, tos
        0x00, 0x00, // total length (filled below)
        0x12, 0x34, // identification
        0x00, 0x00, // flags/fragment offset
        ttl, protocol, 0x00, 0x00, // ttl, protocol, checksum (filled below)
    ];
    header[2..4].copy_from_slice(&total_len.to_be_bytes());
    header.extend_from_slice(&src);
    header.extend_from_slice(&dst);
    let checksum = ipv4_checksum(&header);
    header[10..12].copy_from_slice(&checksum.to_be_bytes());
    header.extend_from_slice(payload);
    header
}

/// IPv6 header followed by payload.
pub fn ipv6_pkt(
    src: [u8; 16],
    dst: [u8; 16],
    next_header: u8,
    hop_limit: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut header = vec![0x60, 0x00, 0x00, 0x00];
    header.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    header.push(next_header);
    header.push(hop_limit);
    header.extend_from_slice(&src);
    header.extend_from_slice(&dst);
    header.extend_from_slice(payload);
    header
}

/// Minimal 20-byte TCP header followed by payload.
pub fn tcp_seg(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut seg = Vec::with_capacity(20 + payload.len());
    seg.extend_from_slice(&src_port.to_be_bytes());
    seg.extend_from_slice(&dst_port.to_be_bytes());
    seg.extend_from_slice(&1u32.to_be_bytes()); // seq
    seg.extend_from_slice(&0u32.to_be_bytes()); // ack
    seg.push(0x50); // data offset 5
    seg.push(0x10); // ACK
    seg.extend_from_slice(&1024u16.to_be_bytes()); // window
    seg.extend_from_slice(&0u16.to_be_bytes()); // checksum
    seg.extend_from_slice(&0u16.to_be_bytes()); // urgent
    seg.extend_from_slice(payload);
    seg
}

/// UDP datagram.
pub fn udp_dgram(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut dgram = Vec::with_capacity(8 + payload.len());
    dgram.extend_from_slice(&src_port.to_be_bytes());
    dgram.extend_from_slice(&dst_port.to_be_bytes());
    dgram.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    dgram.extend_from_slice(&0u16.to_be_bytes()); // checksum
    dgram.extend_from_slice(payload);
    dgram
}

/// SCTP common header followed by payload.
pub fn sctp_pkt(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(12 + payload.len());
    pkt.extend_from_slice(&src_port.to_be_bytes());
    pkt.extend_from_slice(&dst_port.to_be_bytes());
    pkt.extend_from_slice(&0xdeadbeefu32.to_be_bytes()); // verification tag
    pkt.extend_from_slice(&0u32.to_be_bytes()); // checksum
    pkt.extend_from_slice(payload);
    pkt
}

/// Minimal GRE header (no optional fields) followed by payload.
pub fn gre_hdr(protocol: u16, payload: &[u8]) -> Vec<u8> {
    let mut pkt = vec![0x00, 0x00];
    pkt.extend_from_slice(&protocol.to_be_bytes());
    pkt.extend_from_slice(payload);
    pkt
}

/// ERSPAN Type II header followed by the mirrored Ethernet frame.
pub fn erspan2_hdr(session_id: u16, payload: &[u8]) -> Vec<u8> {
    // version 1 (type II), vlan 0
    let mut pkt = vec![0x10, 0x00];
    // cos/en/t + 10-bit session id
    pkt.extend_from_slice(&(session_id & 0x03ff).to_be_bytes());
    // reserved + index
    pkt.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    pkt.extend_from_slice(payload);
    pkt
}

/// VXLAN header followed by the inner Ethernet frame.
pub fn vxlan_hdr(vni: u32, payload: &[u8]) -> Vec<u8> {
    let mut pkt = vec![0x08, 0x00, 0x00, 0x00];
    pkt.push(((vni >> 16) & 0xff) as u8);
    pkt.push(((vni >> 8) & 0xff) as u8);
    pkt.push((vni & 0xff) as u8);
    pkt.push(0x00);
    pkt.extend_from_slice(payload);
    pkt
}

/// Full Ethernet/IPv4/TCP frame.
pub fn tcp_frame(
    src: [u8; 4],
    dst: [u8; 4],
    src_port: u16,
    dst_port: u16,
    ttl: u8,
    payload: &[u8],
) -> Vec<u8> {
    eth(
        0x0800,
        &ipv4_pkt(src, dst, 6, ttl, &tcp_seg(src_port, dst_port, payload)),
    )
}

/// Full Ethernet/IPv4/UDP frame.
pub fn udp_frame(
    src: [u8; 4],
    dst: [u8; 4],
    src_port: u16,
    dst_port: u16,
    ttl: u8,
    payload: &[u8],
) -> Vec<u8> {
    eth(
        0x0800,
        &ipv4_pkt(src, dst, 17, ttl, &udp_dgram(src_port, dst_port, payload)),
    )
}
