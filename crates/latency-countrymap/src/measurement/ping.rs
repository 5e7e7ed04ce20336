use super::{MeasurementKind, ProbeIndex};
use atlas_client::types::{MeasurementDefinition, PingRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Minimum rtt seen by one probe, with the probe's metadata attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingSample {
    pub probe_id: u64,
    pub src_ip: String,
    pub asn: Option<u32>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub rtt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedProbe {
    pub probe_id: u64,
    pub country: Option<String>,
}

#[derive(Debug, Default)]
pub struct PingMeasurement {
    pub samples: Vec<PingSample>,
    /// Probes whose every packet was lost, with their country
    pub failed_probes: BTreeMap<u64, Option<String>>,
}

impl PingMeasurement {
    pub fn failed(&self) -> Vec<FailedProbe> {
        self.failed_probes
            .iter()
            .map(|(&probe_id, country)| FailedProbe {
                probe_id,
                country: country.clone(),
            })
            .collect()
    }
}

impl MeasurementKind for PingMeasurement {
    type Record = PingRecord;

    const NAME: &'static str = "ping";

    fn definition(&self, target: &str) -> MeasurementDefinition {
        MeasurementDefinition::ping(target)
    }

    fn flush(&mut self, records: Vec<PingRecord>, probes: &ProbeIndex) {
        for record in records {
            let Some(probe) = probes.get(&record.prb_id) else {
                debug!(probe_id = record.prb_id, "result from unselected probe; skipping");
                continue;
            };

            if record.is_failure() {
                self.failed_probes
                    .insert(record.prb_id, probe.country_code.clone());
                continue;
            }

            let (lon, lat) = match probe.lon_lat() {
                Some((lon, lat)) => (Some(lon), Some(lat)),
                None => (None, None),
            };

            self.samples.push(PingSample {
                probe_id: record.prb_id,
                src_ip: record.from,
                asn: probe.asn_v4,
                country: probe.country_code.clone(),
                lat,
                lon,
                rtt: record.min,
            });
        }
    }
}
