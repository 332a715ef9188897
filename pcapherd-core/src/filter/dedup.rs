//! Sliding-window packet deduplication.
//!
//! The fingerprint skips mutable fields so retransmissions and copies that
//! differ only by hop count hash identically; the hashing rule is
//! inspired by the packet deduplication in Arkime's capture path. The
//! window is a ring of time buckets: lookup scans every live bucket,
//! insertion targets the latest, rotation evicts the oldest when the ring
//! overflows.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use crate::packet::Packet;
use crate::protocol::LayerKind;

/// Minimum bucket count. Anything lower breaks the "previous bucket
/// covers the horizon while the current fills" model.
const MIN_BUCKETS: usize = 2;

/// Default bucket duration.
const DEFAULT_BUCKET_DURATION: Duration = Duration::from_secs(2);

/// An MD5 digest of the dedup-relevant packet bytes.
pub type Fingerprint = [u8; 16];

/// Fingerprint a packet for deduplication.
///
/// - IPv4 headers contribute bytes [0..7) and 9, skipping TTL and
///   checksum, plus everything from byte 13.
/// - IPv6 headers contribute bytes [0..6) and [8..), skipping the hop
///   limit.
/// - A TCP or UDP layer contributes its full contents and terminates the
///   fingerprint.
///
/// Packets without a TCP or UDP layer produce no fingerprint and are
/// never deduplicated; hashing ICMP or more obscure protocols would
/// cause more harm than the duplicates do.
pub fn fingerprint(packet: &Packet) -> Option<Fingerprint> {
    let data = packet.data();
    let mut ctx = md5::Context::new();

    for (index, layer) in packet.layers().iter().enumerate() {
        match layer.kind {
            LayerKind::Ipv4 => {
                let header = layer.header(data);
                ctx.consume(&header[0..7]);
                ctx.consume(&header[9..10]);
                ctx.consume(&header[13..]);
            }
            LayerKind::Ipv6 => {
                let header = layer.header(data);
                ctx.consume(&header[0..6]);
                ctx.consume(&header[8..]);
            }
            LayerKind::Tcp | LayerKind::Udp => {
                ctx.consume(packet.layer_header(index));
                ctx.consume(packet.layer_payload(index));
                return Some(ctx.compute().0);
            }
            _ => {}
        }
    }
    None
}

/// FIFO ring of fingerprint buckets spanning a sliding time horizon.
pub struct DedupWindow {
    buckets: VecDeque<HashSet<Fingerprint>>,
    max_buckets: usize,
    bucket_duration: Duration,
    /// Wall-clock stamp of the current bucket.
    stamp: Instant,
}

impl DedupWindow {
    /// Create a window of `max_buckets` buckets, each spanning
    /// `bucket_duration`. A bucket count below two is promoted; a zero
    /// duration falls back to the default.
    pub fn new(max_buckets: usize, bucket_duration: Duration) -> Self {
        let max_buckets = max_buckets.max(MIN_BUCKETS);
        let bucket_duration = if bucket_duration.is_zero() {
            DEFAULT_BUCKET_DURATION
        } else {
            bucket_duration
        };

        let mut buckets = VecDeque::with_capacity(max_buckets);
        buckets.push_back(HashSet::new());
        DedupWindow {
            buckets,
            max_buckets,
            bucket_duration,
            stamp: Instant::now(),
        }
    }

    /// Report whether `packet` was already seen inside the window. A
    /// fresh fingerprint is inserted into the current bucket; a known one
    /// is not re-inserted.
    pub fn drop_packet(&mut self, packet: &Packet) -> bool {
        let Some(fp) = fingerprint(packet) else {
            return false;
        };

        let found = self.buckets.iter().any(|bucket| bucket.contains(&fp));
        if !found {
            if let Some(current) = self.buckets.back_mut() {
                current.insert(fp);
            }
        }
        self.rotate();
        found
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Fingerprints currently held across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    /// Whether no fingerprint is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rotate(&mut self) {
        if self.stamp.elapsed() <= self.bucket_duration {
            return;
        }
        self.buckets.push_back(HashSet::new());
        self.stamp = Instant::now();
        if self.buckets.len() > self.max_buckets {
            self.buckets.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_support as ts;
    use crate::protocol::default_registry;
    use bytes::Bytes;

    fn packet(frame: Vec<u8>) -> Packet {
        Packet::decode(&default_registry(), 1, Bytes::from(frame))
    }

    fn tcp_with_ttl(ttl: u8) -> Packet {
        packet(ts::eth(
            0x0800,
            &ts::ipv4_pkt(
                [127, 0, 0, 1],
                [8, 8, 8, 8],
                6,
                ttl,
                &ts::tcp_seg(29999, 80, &[10, 20, 30]),
            ),
        ))
    }

    #[test]
    fn test_ttl_and_checksum_do_not_affect_hash() {
        // The ipv4_pkt builder derives the header checksum, so a TTL
        // change flips both skipped fields at once.
        let a = fingerprint(&tcp_with_ttl(13)).unwrap();
        let b = fingerprint(&tcp_with_ttl(99)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_address_change_alters_hash() {
        let a = fingerprint(&packet(ts::tcp_frame(
            [127, 0, 0, 1],
            [8, 8, 8, 8],
            30000,
            80,
            64,
            b"",
        )))
        .unwrap();
        let b = fingerprint(&packet(ts::tcp_frame(
            [127, 0, 0, 1],
            [8, 8, 4, 4],
            30000,
            80,
            64,
            b"",
        )))
        .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_port_and_payload_changes_alter_hash() {
        let base = fingerprint(&packet(ts::udp_frame(
            [1, 1, 1, 1],
            [2, 2, 2, 2],
            1000,
            2000,
            64,
            b"data",
        )))
        .unwrap();
        let port = fingerprint(&packet(ts::udp_frame(
            [1, 1, 1, 1],
            [2, 2, 2, 2],
            1001,
            2000,
            64,
            b"data",
        )))
        .unwrap();
        let payload = fingerprint(&packet(ts::udp_frame(
            [1, 1, 1, 1],
            [2, 2, 2, 2],
            1000,
            2000,
            64,
            b"DATA",
        )))
        .unwrap();
        assert_ne!(base, port);
        assert_ne!(base, payload);
    }

    #[test]
    fn test_ipv6_hop_limit_skipped() {
        let v6 = |hop: u8| {
            packet(ts::eth(
                0x86DD,
                &ts::ipv6_pkt(
                    [0x20, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
                    [0x20, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2],
                    6,
                    hop,
                    &ts::tcp_seg(1, 2, b"x"),
                ),
            ))
        };
        assert_eq!(fingerprint(&v6(1)).unwrap(), fingerprint(&v6(255)).unwrap());
    }

    #[test]
    fn test_non_transport_packet_has_no_fingerprint() {
        // ICMP echo: no TCP/UDP layer, never deduplicated.
        let icmp = packet(ts::eth(
            0x0800,
            &ts::ipv4_pkt([1, 1, 1, 1], [2, 2, 2, 2], 1, 64, &[8, 0, 0, 0]),
        ));
        assert!(fingerprint(&icmp).is_none());

        let mut window = DedupWindow::new(3, Duration::from_secs(2));
        assert!(!window.drop_packet(&icmp));
        assert!(!window.drop_packet(&icmp));
        assert!(window.is_empty());
    }

    #[test]
    fn test_window_drops_duplicates() {
        // Scenario: three identical TCP packets through DedupWindow(3, 2s).
        let mut window = DedupWindow::new(3, Duration::from_secs(2));
        let pkt = tcp_with_ttl(64);

        assert!(!window.drop_packet(&pkt));
        assert!(window.drop_packet(&pkt));
        assert!(window.drop_packet(&pkt));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_window_promotes_bucket_count() {
        let window = DedupWindow::new(0, Duration::from_secs(1));
        assert_eq!(window.max_buckets, 2);

        let window = DedupWindow::new(8, Duration::ZERO);
        assert_eq!(window.bucket_duration, DEFAULT_BUCKET_DURATION);
    }

    #[test]
    fn test_rotation_evicts_oldest() {
        let mut window = DedupWindow::new(2, Duration::from_millis(5));
        let pkt = tcp_with_ttl(64);
        assert!(!window.drop_packet(&pkt));

        // Let two bucket periods pass so the original bucket ages out.
        std::thread::sleep(Duration::from_millis(10));
        let other = packet(ts::tcp_frame([9, 9, 9, 9], [8, 8, 8, 8], 1, 2, 64, b""));
        window.drop_packet(&other);
        std::thread::sleep(Duration::from_millis(10));
        window.drop_packet(&other);

        assert!(window.bucket_count() <= 2);
    }
}
