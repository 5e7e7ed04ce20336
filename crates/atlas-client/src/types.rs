use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Status id Atlas assigns to probes that are currently connected.
pub const STATUS_CONNECTED: u8 = 1;

/// Tag set on probes whose IPv4 connectivity checks pass.
pub const TAG_IPV4_WORKS: &str = "system-ipv4-works";

/// A single page of a paginated Atlas listing.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: u64,
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// NOTE:
/// - Only the fields needed for latency mapping are kept
/// - Abandoned or never-connected probes may lack asn, country and geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    pub id: u64,
    #[serde(default)]
    pub address_v4: Option<String>,
    #[serde(default)]
    pub asn_v4: Option<u32>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub geometry: Option<Point>,
    #[serde(default)]
    pub status: Option<ProbeStatus>,
}

impl Probe {
    /// `(lon, lat)` as reported by the platform.
    pub fn lon_lat(&self) -> Option<(f64, f64)> {
        self.geometry.as_ref().map(|g| (g.lon(), g.lat()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeStatus {
    pub id: u8,
    pub name: String,
}

/// GeoJSON point, coordinates ordered `[lon, lat]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(rename = "type", default = "point_type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

impl Point {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            kind: point_type(),
            coordinates: [lon, lat],
        }
    }

    pub fn lon(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }
}

fn point_type() -> String {
    "Point".to_string()
}

/// Query for the probe listing endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeFilter {
    pub country_code: Option<String>,
    pub ids: Vec<u64>,
    pub status: Option<u8>,
    pub tags: Vec<String>,
}

impl ProbeFilter {
    /// Connected probes with working IPv4.
    pub fn connected_ipv4() -> Self {
        Self {
            status: Some(STATUS_CONNECTED),
            tags: vec![TAG_IPV4_WORKS.to_string()],
            ..Default::default()
        }
    }

    pub fn by_ids(ids: Vec<u64>) -> Self {
        Self {
            ids,
            ..Default::default()
        }
    }

    pub fn with_country(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = Some(country_code.into().to_uppercase());
        self
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(country) = &self.country_code {
            pairs.push(("country_code", country.clone()));
        }
        if !self.ids.is_empty() {
            pairs.push(("id__in", join_ids(&self.ids)));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.to_string()));
        }
        if !self.tags.is_empty() {
            pairs.push(("tags", self.tags.join(",")));
        }
        pairs
    }
}

pub(crate) fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementType {
    Ping,
    Traceroute,
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => write!(f, "ping"),
            Self::Traceroute => write!(f, "traceroute"),
        }
    }
}

/// Packet protocol used by traceroute measurements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Icmp,
    Udp,
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Icmp => write!(f, "ICMP"),
            Self::Udp => write!(f, "UDP"),
            Self::Tcp => write!(f, "TCP"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ICMP" => Ok(Self::Icmp),
            "UDP" => Ok(Self::Udp),
            "TCP" => Ok(Self::Tcp),
            other => Err(format!("unknown protocol '{other}', expected ICMP, UDP or TCP")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementDefinition {
    #[serde(rename = "type")]
    pub kind: MeasurementType,
    pub target: String,
    pub af: u8,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

impl MeasurementDefinition {
    pub fn ping(target: &str) -> Self {
        Self {
            kind: MeasurementType::Ping,
            target: target.to_string(),
            af: 4,
            description: format!("ping {target}"),
            protocol: None,
        }
    }

    pub fn traceroute(target: &str, protocol: Protocol) -> Self {
        Self {
            kind: MeasurementType::Traceroute,
            target: target.to_string(),
            af: 4,
            description: format!("traceroute {target} ({protocol})"),
            protocol: Some(protocol),
        }
    }
}

/// Explicit probe list for a measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    pub requested: usize,
}

impl ProbeSource {
    pub fn from_ids(ids: &[u64]) -> Self {
        Self {
            kind: "probes".to_string(),
            value: join_ids(ids),
            requested: ids.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRequest {
    pub definitions: Vec<MeasurementDefinition>,
    pub probes: Vec<ProbeSource>,
    pub is_oneoff: bool,
}

impl MeasurementRequest {
    pub fn one_off(definition: MeasurementDefinition, probe_ids: &[u64]) -> Self {
        Self {
            definitions: vec![definition],
            probes: vec![ProbeSource::from_ids(probe_ids)],
            is_oneoff: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MeasurementCreated {
    pub measurements: Vec<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub title: Option<String>,
    pub detail: String,
}

/// Minimal view of any result record, used to recover which probes took part
/// in an existing measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ProbeRef {
    pub prb_id: u64,
}

/// Ping result as returned by the results endpoint. `min` is `-1` when every
/// packet was lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingRecord {
    pub prb_id: u64,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub dst_addr: Option<String>,
    #[serde(default = "no_reply")]
    pub min: f64,
    #[serde(default)]
    pub avg: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl PingRecord {
    pub fn is_failure(&self) -> bool {
        self.min == -1.0
    }
}

fn no_reply() -> f64 {
    -1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerouteRecord {
    pub prb_id: u64,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub dst_addr: String,
    #[serde(default)]
    pub result: Vec<RawHop>,
}

/// One hop of a traceroute: either a list of replies or an error string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHop {
    pub hop: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Vec<HopReply>,
}

/// A reply to a single packet. Timeouts come back as `{"x": "*"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HopReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
}
