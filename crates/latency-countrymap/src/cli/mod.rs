pub mod countrymap;
pub mod ping;
pub mod probes;
pub mod trace;

use clap::Args;
use latency_countrymap::{
    export::{ExportOptions, OutputFormat},
    survey::SurveyRequest,
};
use std::{path::PathBuf, time::Duration};

/// Arguments shared by every command that selects probes toward a target
#[derive(Args, Debug, Clone)]
pub struct MeasureArgs {
    /// Hostname or IP address to measure
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Atlas API key (overrides the configured key)
    #[arg(short = 'k', long, value_name = "KEY")]
    pub key: Option<String>,

    /// Only use probes located in this country (ISO 3166-1 alpha-2)
    #[arg(short = 'c', long, value_name = "CC", value_parser = parse_country)]
    pub country: Option<String>,

    /// Maximum number of probes
    #[arg(
        short = 'n',
        long = "probe-number",
        value_name = "N",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub probe_number: Option<u64>,

    /// Seconds to wait for results after creating measurements
    #[arg(short = 't', long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Read results of existing measurements instead of creating new ones
    #[arg(short = 'm', long, value_name = "IDS", value_delimiter = ',')]
    pub msms: Vec<u64>,
}

impl MeasureArgs {
    pub fn request(&self) -> SurveyRequest {
        SurveyRequest {
            target: self.target.clone(),
            country: self.country.clone(),
            probe_limit: self.probe_number.map(|n| n as usize),
            wait: self.timeout.map(Duration::from_secs),
            measurement_ids: self.msms.clone(),
        }
    }
}

/// Common output options for CLI commands
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,

    /// Write to this file instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

impl From<&OutputArgs> for ExportOptions {
    fn from(args: &OutputArgs) -> Self {
        Self {
            format: args.format,
            output_file: args.output.clone(),
        }
    }
}

fn parse_country(value: &str) -> Result<String, String> {
    if value.len() == 2 && value.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(value.to_ascii_uppercase())
    } else {
        Err(format!("'{value}' is not a two-letter country code (e.g. NL)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_country() {
        assert_eq!(parse_country("nl"), Ok("NL".to_string()));
        assert_eq!(parse_country("US"), Ok("US".to_string()));
        assert!(parse_country("NLD").is_err());
        assert!(parse_country("1A").is_err());
    }
}
