use crate::{
    aggregate::CountryStats,
    measurement::{FailedProbe, HopOutcome, PingSample, Trace},
};
use anyhow::Result;
use atlas_client::types::Probe;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    fs::{File, create_dir_all},
    io::Write,
    path::PathBuf,
};
use tabled::{Table, Tabled, settings::Style};
use tracing::info;

/// Unified output format for all CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    #[value(name = "csv")]
    Csv,
    #[value(name = "json")]
    Json,
    #[value(name = "json-pretty")]
    JsonPretty,
    #[value(name = "table")]
    Table,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Json => write!(f, "json"),
            Self::JsonPretty => write!(f, "json-pretty"),
            Self::Table => write!(f, "table"),
        }
    }
}

/// Trait for types that can be exported to various formats
pub trait Exportable {
    fn export(&self, format: OutputFormat) -> Result<String>;
}

/// Options for exporting data
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: OutputFormat,
    pub output_file: Option<PathBuf>,
}

impl ExportOptions {
    /// Write exportable data to file or stdout
    pub fn write<T: Exportable + ?Sized>(&self, data: &T) -> Result<()> {
        let content = data.export(self.format)?;

        if let Some(path) = &self.output_file {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    create_dir_all(parent)?;
                }
            }
            let mut file = File::create(path)?;
            file.write_all(content.as_bytes())?;
            info!("Exported to: {}", path.display());
        } else {
            println!("{content}");
        }

        Ok(())
    }
}

/// Helper function to convert data to CSV format
pub fn to_csv_string<T: Serialize>(records: &[T]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record)?;
    }
    let data = wtr.into_inner()?;
    Ok(String::from_utf8(data)?)
}

/// Helper function to convert data to JSON format
pub fn to_json_string<T: Serialize + ?Sized>(data: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(data)?)
    } else {
        Ok(serde_json::to_string(data)?)
    }
}

pub fn to_table_string<T: Tabled>(rows: Vec<T>) -> String {
    Table::new(rows)
        .with(Style::psql().remove_horizontals())
        .to_string()
}

/// CSV and table output use flat rows; JSON keeps the nested shape of `data`.
fn export_rows<S, R>(data: &S, rows: Vec<R>, format: OutputFormat) -> Result<String>
where
    S: Serialize + ?Sized,
    R: Serialize + Tabled,
{
    match format {
        OutputFormat::Csv => to_csv_string(&rows),
        OutputFormat::Json => to_json_string(data, false),
        OutputFormat::JsonPretty => to_json_string(data, true),
        OutputFormat::Table => Ok(to_table_string(rows)),
    }
}

fn display_option<T: fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default()
}

fn display_ms(value: &f64) -> String {
    format!("{value:.3}")
}

#[derive(Debug, Serialize, Tabled)]
struct PingRow {
    #[tabled(rename = "probe")]
    probe_id: u64,
    src_ip: String,
    #[tabled(display = "display_option")]
    asn: Option<u32>,
    #[tabled(display = "display_option")]
    country: Option<String>,
    #[tabled(display = "display_option")]
    lat: Option<f64>,
    #[tabled(display = "display_option")]
    lon: Option<f64>,
    #[tabled(display = "display_ms", rename = "rtt(ms)")]
    rtt: f64,
}

impl From<&PingSample> for PingRow {
    fn from(sample: &PingSample) -> Self {
        Self {
            probe_id: sample.probe_id,
            src_ip: sample.src_ip.clone(),
            asn: sample.asn,
            country: sample.country.clone(),
            lat: sample.lat,
            lon: sample.lon,
            rtt: sample.rtt,
        }
    }
}

impl Exportable for [PingSample] {
    fn export(&self, format: OutputFormat) -> Result<String> {
        let rows: Vec<PingRow> = self.iter().map(PingRow::from).collect();
        export_rows(self, rows, format)
    }
}

#[derive(Debug, Serialize, Tabled)]
struct FailedRow {
    #[tabled(rename = "probe")]
    probe_id: u64,
    #[tabled(display = "display_option")]
    country: Option<String>,
}

impl Exportable for [FailedProbe] {
    fn export(&self, format: OutputFormat) -> Result<String> {
        let rows: Vec<FailedRow> = self
            .iter()
            .map(|failed| FailedRow {
                probe_id: failed.probe_id,
                country: failed.country.clone(),
            })
            .collect();
        export_rows(self, rows, format)
    }
}

/// One traceroute hop, flattened for CSV and table output.
#[derive(Debug, Serialize, Tabled)]
struct HopRow {
    #[tabled(rename = "probe")]
    probe_id: u64,
    src_ip: String,
    dst_ip: String,
    reached: bool,
    hop: u32,
    #[tabled(display = "display_option")]
    ip: Option<String>,
    #[tabled(display = "display_option", rename = "rtt(ms)")]
    rtt: Option<f64>,
    #[tabled(display = "display_option")]
    error: Option<String>,
}

impl Exportable for [Trace] {
    fn export(&self, format: OutputFormat) -> Result<String> {
        let rows: Vec<HopRow> = self
            .iter()
            .flat_map(|trace| {
                trace.hops.iter().map(move |hop| {
                    let (ip, rtt, error) = match &hop.outcome {
                        HopOutcome::Reply { ip, rtt } => {
                            (Some(ip.clone().unwrap_or_else(|| "*".to_string())), *rtt, None)
                        }
                        HopOutcome::Error { message } => (None, None, Some(message.clone())),
                    };
                    HopRow {
                        probe_id: trace.probe_id,
                        src_ip: trace.src_ip.clone(),
                        dst_ip: trace.dst_ip.clone(),
                        reached: trace.reached_destination,
                        hop: hop.number,
                        ip,
                        rtt,
                        error,
                    }
                })
            })
            .collect();
        export_rows(self, rows, format)
    }
}

#[derive(Debug, Serialize, Tabled)]
struct ProbeRow {
    #[tabled(rename = "probe")]
    id: u64,
    #[tabled(display = "display_option")]
    address_v4: Option<String>,
    #[tabled(display = "display_option")]
    asn: Option<u32>,
    #[tabled(display = "display_option")]
    country: Option<String>,
    #[tabled(display = "display_option")]
    lat: Option<f64>,
    #[tabled(display = "display_option")]
    lon: Option<f64>,
}

impl Exportable for [Probe] {
    fn export(&self, format: OutputFormat) -> Result<String> {
        let rows: Vec<ProbeRow> = self
            .iter()
            .map(|probe| {
                let (lon, lat) = probe.lon_lat().unzip();
                ProbeRow {
                    id: probe.id,
                    address_v4: probe.address_v4.clone(),
                    asn: probe.asn_v4,
                    country: probe.country_code.clone(),
                    lat,
                    lon,
                }
            })
            .collect();
        export_rows(self, rows, format)
    }
}

#[derive(Debug, Serialize, Tabled)]
struct CountryRow {
    country: String,
    probes: usize,
    #[tabled(display = "display_ms", rename = "mean(ms)")]
    mean_rtt_ms: f64,
    #[tabled(display = "display_ms", rename = "min(ms)")]
    min_rtt_ms: f64,
    #[tabled(display = "display_ms", rename = "max(ms)")]
    max_rtt_ms: f64,
}

impl Exportable for BTreeMap<String, CountryStats> {
    fn export(&self, format: OutputFormat) -> Result<String> {
        let rows: Vec<CountryRow> = self
            .iter()
            .map(|(country, stats)| CountryRow {
                country: country.clone(),
                probes: stats.probes,
                mean_rtt_ms: stats.mean_rtt_ms,
                min_rtt_ms: stats.min_rtt_ms,
                max_rtt_ms: stats.max_rtt_ms,
            })
            .collect();
        export_rows(self, rows, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::Hop;

    fn samples() -> Vec<PingSample> {
        vec![
            PingSample {
                probe_id: 7,
                src_ip: "192.0.2.7".to_string(),
                asn: Some(3333),
                country: Some("NL".to_string()),
                lat: Some(52.4),
                lon: Some(4.9),
                rtt: 4.5,
            },
            PingSample {
                probe_id: 8,
                src_ip: "192.0.2.8".to_string(),
                asn: None,
                country: None,
                lat: None,
                lon: None,
                rtt: 80.0,
            },
        ]
    }

    fn trace() -> Trace {
        Trace {
            probe_id: 3,
            src_ip: "192.0.2.3".to_string(),
            dst_ip: "198.51.100.1".to_string(),
            reached_destination: false,
            hops: vec![
                Hop {
                    number: 1,
                    outcome: HopOutcome::Reply {
                        ip: Some("10.0.0.1".to_string()),
                        rtt: Some(0.5),
                    },
                },
                Hop {
                    number: 2,
                    outcome: HopOutcome::Reply { ip: None, rtt: None },
                },
                Hop {
                    number: 255,
                    outcome: HopOutcome::Error {
                        message: "no route".to_string(),
                    },
                },
            ],
        }
    }

    #[test]
    fn test_ping_samples_to_csv() {
        let csv = samples().export(OutputFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("probe_id,src_ip,asn,country,lat,lon,rtt")
        );
        assert_eq!(lines.next(), Some("7,192.0.2.7,3333,NL,52.4,4.9,4.5"));
        assert_eq!(lines.next(), Some("8,192.0.2.8,,,,,80.0"));
    }

    #[test]
    fn test_ping_samples_to_table() {
        let table = samples().export(OutputFormat::Table).unwrap();
        assert!(table.contains("rtt(ms)"));
        assert!(table.contains("src_ip"));
        assert!(table.contains("4.500"));
        assert!(table.contains("NL"));
    }

    #[test]
    fn test_trace_rows_flatten_hops() {
        let traces = vec![trace()];

        let csv = traces.export(OutputFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "probe_id,src_ip,dst_ip,reached,hop,ip,rtt,error");
        assert_eq!(lines[2], "3,192.0.2.3,198.51.100.1,false,2,*,,");
        assert_eq!(lines[3], "3,192.0.2.3,198.51.100.1,false,255,,,no route");

        let json: serde_json::Value =
            serde_json::from_str(&traces.export(OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json[0]["hops"][2]["kind"], "error");
        assert_eq!(json[0]["hops"][0]["ip"], "10.0.0.1");
    }

    #[test]
    fn test_failed_probes_to_json() {
        let failed = vec![FailedProbe {
            probe_id: 12,
            country: Some("BR".to_string()),
        }];
        let json = failed.export(OutputFormat::Json).unwrap();
        assert_eq!(json, r#"[{"probe_id":12,"country":"BR"}]"#);
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("pings.csv");
        let options = ExportOptions {
            format: OutputFormat::Csv,
            output_file: Some(path.clone()),
        };

        options.write(samples().as_slice()).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("probe_id,"));
    }
}
