use super::{MeasureArgs, OutputArgs};
use anyhow::Result;
use atlas_client::{AtlasApi, types::Probe};
use clap::Args;
use latency_countrymap::{export::ExportOptions, settings::Settings, survey};

#[derive(Args, Debug)]
pub struct ProbesArgs {
    #[command(flatten)]
    pub measure: MeasureArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

pub async fn handle<A: AtlasApi>(api: &A, settings: &Settings, args: ProbesArgs) -> Result<()> {
    let probes: Vec<Probe> = survey::probes(api, settings, &args.measure.request())
        .await?
        .into_values()
        .collect();

    ExportOptions::from(&args.output).write(probes.as_slice())
}
