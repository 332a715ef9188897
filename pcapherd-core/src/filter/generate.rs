//! Filter config generation from EVE alert logs.
//!
//! Scans a line-delimited JSON stream of Suricata EVE events and emits one
//! filter per distinct alerted flow: two subnet conditions pinning the
//! flow's addresses and, for TCP/UDP flows, two port conditions. The
//! filter is named by the flow id. Feeding the result back through the
//! filter engine extracts each alerted flow's packets from a pcap corpus.

use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::filter::config::{CombinedConfig, ConditionConfig, FilterConfig};

/// The slice of an EVE event this generator consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct EveEvent {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub flow_id: u64,
    pub src_ip: Option<IpAddr>,
    pub dest_ip: Option<IpAddr>,
    pub src_port: Option<u16>,
    pub dest_port: Option<u16>,
    #[serde(default)]
    pub proto: String,
}

/// Generate a filter config from an EVE JSON file.
///
/// `on_parse_error` is invoked for every unparseable line and returns
/// whether scanning should continue.
pub fn generate<P, F>(path: P, mut on_parse_error: F) -> Result<FilterConfig>
where
    P: AsRef<Path>,
    F: FnMut(&Error) -> bool,
{
    let reader = BufReader::new(crate::io::open(path.as_ref())?);

    let mut config = FilterConfig::new();
    let mut seen_flows: HashSet<u64> = HashSet::new();

    for line in reader.lines() {
        let line = line.map_err(Error::Io)?;
        if line.trim().is_empty() {
            continue;
        }
        let event: EveEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                let err = Error::Json(e);
                if on_parse_error(&err) {
                    continue;
                }
                return Err(err);
            }
        };

        if event.event_type != "alert" || !seen_flows.insert(event.flow_id) {
            continue;
        }
        config.insert(event.flow_id.to_string(), filter_from_event(&event));
    }

    debug!(count = config.len(), "filters extracted from EVE stream");
    Ok(config)
}

/// One alerted flow as a combined filter: both addresses pinned, plus the
/// port pair for TCP/UDP flows.
fn filter_from_event(event: &EveEvent) -> CombinedConfig {
    let mut conditions = Vec::with_capacity(4);

    for ip in [event.src_ip, event.dest_ip].into_iter().flatten() {
        conditions.push(ConditionConfig::new("subnet", vec![host_cidr(ip)]));
    }

    let proto = event.proto.to_ascii_lowercase();
    if proto == "tcp" || proto == "udp" {
        for port in [event.src_port, event.dest_port].into_iter().flatten() {
            conditions.push(ConditionConfig::new(
                "port",
                vec![format!("{}/{}", port, proto)],
            ));
        }
    }

    CombinedConfig { conditions }
}

/// Render an address as a single-host CIDR.
fn host_cidr(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}/32", v4),
        IpAddr::V6(v6) => format!("{}/128", v6),
    }
}
