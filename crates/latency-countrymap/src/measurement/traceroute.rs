use super::{MeasurementKind, ProbeIndex};
use atlas_client::types::{MeasurementDefinition, Protocol, RawHop, TracerouteRecord};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HopOutcome {
    /// First reply of the hop; `ip` is `None` for `*`
    Reply { ip: Option<String>, rtt: Option<f64> },
    /// The probe could not send or receive at this hop
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hop {
    pub number: u32,
    #[serde(flatten)]
    pub outcome: HopOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub probe_id: u64,
    pub src_ip: String,
    pub dst_ip: String,
    pub reached_destination: bool,
    pub hops: Vec<Hop>,
}

impl Trace {
    pub fn from_record(record: &TracerouteRecord) -> Self {
        let mut hops = Vec::with_capacity(record.result.len());
        let mut reached_destination = false;

        for raw in &record.result {
            let hop = parse_hop(raw);
            let at_destination = matches!(
                &hop.outcome,
                HopOutcome::Reply { ip: Some(ip), .. } if *ip == record.dst_addr
            );
            hops.push(hop);

            if at_destination {
                reached_destination = true;
                break;
            }
        }

        Self {
            probe_id: record.prb_id,
            src_ip: record.from.clone(),
            dst_ip: record.dst_addr.clone(),
            reached_destination,
            hops,
        }
    }
}

fn parse_hop(raw: &RawHop) -> Hop {
    let outcome = match &raw.error {
        Some(message) => HopOutcome::Error {
            message: message.clone(),
        },
        None => {
            let first = raw.result.first();
            HopOutcome::Reply {
                ip: first.and_then(|reply| reply.from.clone()),
                rtt: first.and_then(|reply| reply.rtt),
            }
        }
    };

    Hop {
        number: raw.hop,
        outcome,
    }
}

#[derive(Debug, Default)]
pub struct TracerouteMeasurement {
    pub protocol: Protocol,
    pub traces: Vec<Trace>,
}

impl TracerouteMeasurement {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            traces: Vec::new(),
        }
    }

    /// Traces that never got a reply from the destination.
    pub fn incomplete(&self) -> impl Iterator<Item = &Trace> {
        self.traces.iter().filter(|trace| !trace.reached_destination)
    }
}

impl MeasurementKind for TracerouteMeasurement {
    type Record = TracerouteRecord;

    const NAME: &'static str = "traceroute";

    fn definition(&self, target: &str) -> MeasurementDefinition {
        MeasurementDefinition::traceroute(target, self.protocol)
    }

    fn flush(&mut self, records: Vec<TracerouteRecord>, probes: &ProbeIndex) {
        for record in records {
            if !probes.contains_key(&record.prb_id) {
                debug!(probe_id = record.prb_id, "result from unselected probe; skipping");
                continue;
            }
            self.traces.push(Trace::from_record(&record));
        }
    }
}
