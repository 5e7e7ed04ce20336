use super::{MeasureArgs, OutputArgs};
use anyhow::Result;
use atlas_client::{AtlasApi, types::Protocol};
use clap::Args;
use latency_countrymap::{export::ExportOptions, measurement::Trace, settings::Settings, survey};

#[derive(Args, Debug)]
pub struct TraceArgs {
    #[command(flatten)]
    pub measure: MeasureArgs,

    /// ICMP, UDP or TCP (defaults to the configured protocol)
    #[arg(short = 'P', long, value_name = "PROTO", value_parser = parse_protocol)]
    pub protocol: Option<Protocol>,

    /// Include traces that reached the destination
    #[arg(long)]
    pub all: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

pub async fn handle<A: AtlasApi>(api: &A, settings: &Settings, args: TraceArgs) -> Result<()> {
    let protocol = args.protocol.unwrap_or(settings.measurement.protocol);
    let measurement = survey::traceroute(api, settings, &args.measure.request(), protocol).await?;

    let traces: Vec<Trace> = if args.all {
        measurement.traces
    } else {
        measurement.incomplete().cloned().collect()
    };

    ExportOptions::from(&args.output).write(traces.as_slice())
}

fn parse_protocol(value: &str) -> Result<Protocol, String> {
    value.parse()
}
