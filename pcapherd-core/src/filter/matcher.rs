//! Composable packet matchers.
//!
//! The matcher algebra is a closed set - subnet, endpoint-port, ASN, a
//! negation and an AND-combinator - so it is a tagged enum rather than an
//! open trait hierarchy. There is no disjunction at the top level:
//! disjunction across different filters is realized by running the filter
//! pipeline once per filter against the same input.

use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ipnetwork::IpNetwork;
use maxminddb::geoip2;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::filter::config::{CombinedConfig, FilterConfig};
use crate::packet::{Endpoint, Packet, TransportProto};

/// Opened MaxMind ASN database, shared immutably across matchers.
pub type AsnDatabase = maxminddb::Reader<Vec<u8>>;

/// A recursive packet predicate.
#[derive(Debug)]
pub enum Matcher {
    Subnet(SubnetMatcher),
    Endpoint(EndpointMatcher),
    Asn(AsnMatcher),
    Negate(Box<Matcher>),
    All(Vec<Matcher>),
}

impl Matcher {
    /// Evaluate the predicate against a packet.
    pub fn matches(&self, packet: &Packet) -> bool {
        match self {
            Matcher::Subnet(m) => m.matches(packet),
            Matcher::Endpoint(m) => m.matches(packet),
            Matcher::Asn(m) => m.matches(packet),
            Matcher::Negate(inner) => !inner.matches(packet),
            // Short-circuits at the first false child; empty list is true.
            Matcher::All(children) => children.iter().all(|m| m.matches(packet)),
        }
    }

    /// Number of immediate conditions, for logging.
    pub fn condition_count(&self) -> usize {
        match self {
            Matcher::All(children) => children.len(),
            _ => 1,
        }
    }

    /// Build one combined matcher from its declarative config.
    pub fn from_config(
        name: &str,
        config: &CombinedConfig,
        asn_db: Option<&Arc<AsnDatabase>>,
    ) -> Result<Matcher> {
        if config.conditions.is_empty() {
            return Err(ConfigError::NoConditions {
                name: name.to_string(),
            }
            .into());
        }

        let mut children = Vec::with_capacity(config.conditions.len());
        for condition in &config.conditions {
            let matcher = match condition.kind.as_str() {
                "subnet" => Matcher::Subnet(SubnetMatcher::new(&condition.match_values)?),
                "port" => Matcher::Endpoint(EndpointMatcher::new(&condition.match_values)?),
                "asn" => {
                    let db = asn_db.ok_or(ConfigError::MissingAsnDatabase)?;
                    Matcher::Asn(AsnMatcher::new(db.clone(), &condition.match_values)?)
                }
                other => {
                    return Err(ConfigError::UnknownKind {
                        kind: other.to_string(),
                    }
                    .into());
                }
            };
            children.push(if condition.negate {
                Matcher::Negate(Box::new(matcher))
            } else {
                matcher
            });
        }
        Ok(Matcher::All(children))
    }
}

/// Build every named matcher of a filter config. The ASN database is
/// opened once and shared by all ASN conditions.
pub fn build_matchers(
    config: &FilterConfig,
    asn_db_path: Option<&Path>,
) -> Result<BTreeMap<String, Arc<Matcher>>> {
    let needs_asn = config
        .values()
        .flat_map(|c| c.conditions.iter())
        .any(|c| c.kind == "asn");

    let asn_db = match (needs_asn, asn_db_path) {
        (true, Some(path)) => Some(Arc::new(maxminddb::Reader::open_readfile(path).map_err(
            |e| ConfigError::AsnDatabase {
                path: path.display().to_string(),
                reason: e.to_string(),
            },
        )?)),
        (true, None) => return Err(ConfigError::MissingAsnDatabase.into()),
        _ => None,
    };

    let mut matchers = BTreeMap::new();
    for (name, combined) in config {
        let matcher = Matcher::from_config(name, combined, asn_db.as_ref())?;
        debug!(
            filter = name.as_str(),
            conditions = matcher.condition_count(),
            "matcher built"
        );
        matchers.insert(name.clone(), Arc::new(matcher));
    }
    Ok(matchers)
}

/// Matches when the source or destination address falls in any CIDR.
#[derive(Debug)]
pub struct SubnetMatcher {
    networks: Vec<IpNetwork>,
}

impl SubnetMatcher {
    pub fn new(cidrs: &[String]) -> Result<Self> {
        if cidrs.is_empty() {
            return Err(ConfigError::EmptyCondition { kind: "subnet" }.into());
        }
        let mut networks = Vec::with_capacity(cidrs.len());
        for raw in cidrs {
            let network: IpNetwork = raw.parse().map_err(|e: ipnetwork::IpNetworkError| {
                ConfigError::InvalidCidr {
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            networks.push(network);
        }
        Ok(SubnetMatcher { networks })
    }

    fn matches(&self, packet: &Packet) -> bool {
        match packet.network_endpoints() {
            Some((src, dst)) => self.contains(src) || self.contains(dst),
            None => false,
        }
    }

    fn contains(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(ip))
    }
}

/// Matches when the source or destination transport endpoint is in the
/// set.
#[derive(Debug)]
pub struct EndpointMatcher {
    endpoints: HashSet<Endpoint>,
}

impl EndpointMatcher {
    pub fn new(specs: &[String]) -> Result<Self> {
        if specs.is_empty() {
            return Err(ConfigError::EmptyCondition { kind: "port" }.into());
        }
        let mut endpoints = HashSet::with_capacity(specs.len());
        for raw in specs {
            endpoints.insert(parse_endpoint(raw)?);
        }
        Ok(EndpointMatcher { endpoints })
    }

    fn matches(&self, packet: &Packet) -> bool {
        match packet.transport_endpoints() {
            Some((src, dst)) => self.endpoints.contains(&src) || self.endpoints.contains(&dst),
            None => false,
        }
    }
}

/// Parse a `<port>/<tcp|udp>` condition value.
fn parse_endpoint(raw: &str) -> Result<Endpoint> {
    let invalid = || ConfigError::InvalidPort {
        value: raw.to_string(),
    };

    let (port, proto) = raw.split_once('/').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    let proto = match proto {
        "tcp" => TransportProto::Tcp,
        "udp" => TransportProto::Udp,
        _ => return Err(invalid().into()),
    };
    Ok(Endpoint::new(proto, port))
}

/// Matches when the source or destination address resolves to a member AS
/// number. Lookup misses are safe-misses: counted, never fatal.
#[derive(Debug)]
pub struct AsnMatcher {
    db: Arc<AsnDatabase>,
    values: HashSet<u32>,
    /// Failed database lookups. Atomic because one matcher is shared
    /// read-only across filter workers.
    lookup_errors: AtomicU64,
}

/// Parse decimal AS numbers from condition values.
fn parse_asn_values(asns: &[String]) -> Result<HashSet<u32>> {
    if asns.is_empty() {
        return Err(ConfigError::EmptyCondition { kind: "asn" }.into());
    }
    let mut values = HashSet::with_capacity(asns.len());
    for raw in asns {
        let asn: u32 = raw.parse().map_err(|_| ConfigError::InvalidAsn {
            value: raw.clone(),
        })?;
        values.insert(asn);
    }
    Ok(values)
}

impl AsnMatcher {
    pub fn new(db: Arc<AsnDatabase>, asns: &[String]) -> Result<Self> {
        Ok(AsnMatcher {
            db,
            values: parse_asn_values(asns)?,
            lookup_errors: AtomicU64::new(0),
        })
    }

    /// Number of failed database lookups so far.
    pub fn lookup_errors(&self) -> u64 {
        self.lookup_errors.load(Ordering::Relaxed)
    }

    fn matches(&self, packet: &Packet) -> bool {
        match packet.network_endpoints() {
            Some((src, dst)) => self.resolves(src) || self.resolves(dst),
            None => false,
        }
    }

    fn resolves(&self, ip: IpAddr) -> bool {
        match self.db.lookup::<geoip2::Asn>(ip) {
            Ok(record) => record
                .autonomous_system_number
                .map(|asn| self.values.contains(&asn))
                .unwrap_or(false),
            Err(_) => {
                self.lookup_errors.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}
