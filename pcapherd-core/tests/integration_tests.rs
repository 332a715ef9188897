//! End-to-end tests over the public API: map a directory, round-trip the
//! dataset, replay it into a memory writer, and run the filter pipeline
//! from EVE log to per-filter output files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use bytes::Bytes;
use chrono::DateTime;

use pcapherd_core::filter::{
    build_matchers, generate, run_filter_pool, DedupConfig, FilterPoolConfig, FilterTask,
    TaskOptions,
};
use pcapherd_core::pcapset::{pcap_set_from_dir, MapConfig};
use pcapherd_core::replay::{ReplayConfig, ReplayHandle, WireWriter};
use pcapherd_core::{CancelToken, PcapReader, PcapSet, PcapWriter, Record, Result};

/// Build an Ethernet/IPv4/TCP frame.
fn tcp_frame(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let mut tcp = Vec::new();
    tcp.extend_from_slice(&sport.to_be_bytes());
    tcp.extend_from_slice(&dport.to_be_bytes());
    tcp.extend_from_slice(&[0u8; 8]); // seq + ack
    tcp.extend_from_slice(&[0x50, 0x10]); // offset 5, ACK
    tcp.extend_from_slice(&[0x04, 0x00, 0x00, 0x00, 0x00, 0x00]); // window/csum/urg
    tcp.extend_from_slice(payload);

    let total_len = (20 + tcp.len()) as u16;
    let mut ip = vec![0x45, 0x00];
    ip.extend_from_slice(&total_len.to_be_bytes());
    ip.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 64, 6, 0x00, 0x00]);
    ip.extend_from_slice(&src);
    ip.extend_from_slice(&dst);
    ip.extend_from_slice(&tcp);

    let mut frame = Vec::new();
    frame.extend_from_slice(&[0xbd; 6]);
    frame.extend_from_slice(&[0xaa; 6]);
    frame.extend_from_slice(&[0x08, 0x00]);
    frame.extend_from_slice(&ip);
    frame
}

/// Write a pcap file through the crate's own writer.
fn write_pcap(path: &Path, records: &[(i64, u32, Vec<u8>)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = PcapWriter::new(file, 65535, 1).unwrap();
    for (sec, micros, data) in records {
        writer
            .write_record(&Record {
                ts: DateTime::from_timestamp(*sec, micros * 1000).unwrap(),
                captured_len: data.len() as u32,
                original_len: data.len() as u32,
                data: Bytes::copy_from_slice(data),
            })
            .unwrap();
    }
    let mut out = writer.into_inner().unwrap();
    std::io::Write::flush(&mut out).unwrap();
}

#[derive(Clone, Default)]
struct MemoryWriter {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl WireWriter for MemoryWriter {
    fn write_packet(&mut self, data: &[u8]) -> Result<()> {
        self.frames.lock().unwrap().push(data.to_vec());
        Ok(())
    }
}

/// Two interleaved capture files: A at t=1000..1004s, B at t=1002..1006s.
fn seed_capture_dir(dir: &Path) -> (PathBuf, PathBuf) {
    let a = dir.join("a.pcap");
    let b = dir.join("b.pcap");
    write_pcap(
        &a,
        &[
            (1000, 0, tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 1000, 443, b"a1")),
            (1002, 0, tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 1000, 443, b"a2")),
            (1004, 0, tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 1000, 443, b"a3")),
        ],
    );
    write_pcap(
        &b,
        &[
            (1002, 0, tcp_frame([8, 8, 8, 8], [10, 0, 0, 9], 53, 40000, b"b1")),
            (1006, 0, tcp_frame([8, 8, 8, 8], [10, 0, 0, 9], 53, 40000, b"b2")),
        ],
    );
    (a, b)
}

fn map_dir(dir: &Path) -> PcapSet {
    let config = MapConfig {
        directory: dir.to_path_buf(),
        suffix: "pcap".into(),
        pattern: None,
        workers: 2,
    };
    pcap_set_from_dir(&config, &CancelToken::never()).unwrap()
}

#[test]
fn map_round_trip_and_replay_conserves_packets() {
    let dir = tempfile::tempdir().unwrap();
    seed_capture_dir(dir.path());

    let set = map_dir(dir.path());
    assert_eq!(set.files.len(), 2);
    assert_eq!(set.period.beginning.timestamp(), 1000);
    assert_eq!(set.period.end.timestamp(), 1006);
    assert_eq!(set.files[1].delay, chrono::Duration::seconds(2));

    // JSON round trip.
    let dump = dir.path().join("meta.json");
    set.to_json_file(&dump).unwrap();
    let loaded = PcapSet::from_json_file(&dump).unwrap();
    assert_eq!(loaded.files.len(), 2);
    assert_eq!(loaded.period, set.period);

    // Replay with waits disabled sends every mapped packet.
    let total: u64 = loaded.files.iter().map(|f| f.counters.packets).sum();
    let writer = MemoryWriter::default();
    let frames = writer.frames.clone();

    let handle = ReplayHandle::new(ReplayConfig {
        set: loaded,
        speed_modifier: 1_000_000.0,
        disable_wait: true,
        ..Default::default()
    })
    .unwrap();
    let stats = handle
        .play_with_writer(writer, &CancelToken::never())
        .unwrap();

    assert_eq!(stats.written, total);
    assert_eq!(frames.lock().unwrap().len(), total as usize);
}

#[test]
fn replay_scaling_finishes_within_the_window() {
    let dir = tempfile::tempdir().unwrap();
    seed_capture_dir(dir.path());
    let set = map_dir(dir.path());

    // Set duration is 6s; scale into 300ms.
    let window = StdDuration::from_millis(300);
    let handle = ReplayHandle::new(ReplayConfig {
        set,
        scale_duration: Some(window),
        disable_wait: false,
        ..Default::default()
    })
    .unwrap();
    assert!((handle.speed_modifier() - 20.0).abs() < 1e-9);

    let start = std::time::Instant::now();
    let stats = handle
        .play_with_writer(MemoryWriter::default(), &CancelToken::never())
        .unwrap();
    let took = start.elapsed();

    assert_eq!(stats.written, 5);
    // Pacing spreads the run across the window, and drift stays small.
    assert!(took >= StdDuration::from_millis(150), "took {:?}", took);
    assert!(took < StdDuration::from_secs(3), "took {:?}", took);
}

#[test]
fn eve_to_filter_pipeline_extracts_alerted_flow() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("pcaps");
    let output_dir = dir.path().join("filtered");
    std::fs::create_dir_all(&input_dir).unwrap();
    seed_capture_dir(&input_dir);

    // One alert covering the 10.0.0.1 -> 10.0.0.2:443 flow.
    let eve = dir.path().join("eve.json");
    std::fs::write(
        &eve,
        concat!(
            r#"{"event_type":"alert","flow_id":555,"src_ip":"10.0.0.1","dest_ip":"10.0.0.2","src_port":1000,"dest_port":443,"proto":"TCP"}"#,
            "\n",
            r#"{"event_type":"stats"}"#,
            "\n",
        ),
    )
    .unwrap();

    let config = generate(&eve, |_| true).unwrap();
    assert_eq!(config.len(), 1);
    let matchers = build_matchers(&config, None).unwrap();

    run_filter_pool(
        &FilterPoolConfig {
            input_dir,
            output_dir: output_dir.clone(),
            suffix: "pcap".into(),
            workers: 2,
            options: TaskOptions::default(),
        },
        &matchers,
        &CancelToken::never(),
    )
    .unwrap();

    // File A's three packets belong to the alerted flow; file B's do not.
    let count = |path: PathBuf| -> u64 {
        let mut reader = PcapReader::open(path).unwrap();
        let mut n = 0;
        while reader.next_record().unwrap().is_some() {
            n += 1;
        }
        n
    };
    assert_eq!(count(output_dir.join("555").join("a.pcap")), 3);
    assert_eq!(count(output_dir.join("555").join("b.pcap")), 0);
}

#[test]
fn dedup_suppresses_replayed_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("doubled.pcap");

    // The same three flows appear twice, as if the capture were replayed.
    let flows: Vec<Vec<u8>> = (0..3u16)
        .map(|i| tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 1000 + i, 443, b"x"))
        .collect();
    let mut records: Vec<(i64, u32, Vec<u8>)> = Vec::new();
    for pass in 0..2i64 {
        for (i, frame) in flows.iter().enumerate() {
            records.push((1000 + pass, (i as u32) * 1000, frame.clone()));
        }
    }
    write_pcap(&input, &records);

    let task = FilterTask {
        input,
        output: dir.path().join("out.pcap"),
        matcher: Arc::new(pcapherd_core::filter::Matcher::All(vec![])),
        description: "dedup".into(),
    };
    let options = TaskOptions {
        dedup: Some(DedupConfig {
            buckets: 3,
            bucket_duration: StdDuration::from_secs(30),
        }),
        ..Default::default()
    };
    let result = pcapherd_core::filter::read_and_filter(
        &task,
        &options,
        &pcapherd_core::protocol::default_registry(),
        &CancelToken::never(),
    )
    .unwrap();

    assert_eq!(result.count, 6);
    assert_eq!(result.matched, 3);
    assert_eq!(result.deduplicated, 3);
    assert_eq!(
        result.count,
        result.matched + result.skipped + result.decap_errors + result.deduplicated + result.errors
    );
}

#[test]
fn filter_output_name_strips_compound_extensions() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("in");
    let output_dir = dir.path().join("out");
    std::fs::create_dir_all(&input_dir).unwrap();

    // A gzipped input whose name already carries .pcap.gz.
    let plain = input_dir.join("trace.pcap");
    write_pcap(
        &plain,
        &[(1000, 0, tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b""))],
    );
    let gz = input_dir.join("trace.pcap.gz");
    pcapherd_core::io::gzip_compress(&plain, &gz, true).unwrap();

    let mut filters = BTreeMap::new();
    filters.insert(
        "all".to_string(),
        Arc::new(pcapherd_core::filter::Matcher::All(vec![])),
    );
    run_filter_pool(
        &FilterPoolConfig {
            input_dir,
            output_dir: output_dir.clone(),
            suffix: "pcap.gz".into(),
            workers: 1,
            options: TaskOptions {
                compress: true,
                ..Default::default()
            },
        },
        &filters,
        &CancelToken::never(),
    )
    .unwrap();

    // No foo.pcap.gz.gz: the compound extension was stripped first.
    assert!(output_dir.join("all").join("trace.pcap.gz").exists());
    assert!(!output_dir.join("all").join("trace.pcap.gz.gz").exists());
}
