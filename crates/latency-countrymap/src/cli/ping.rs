use super::{MeasureArgs, OutputArgs};
use anyhow::Result;
use atlas_client::AtlasApi;
use clap::Args;
use latency_countrymap::{
    export::{ExportOptions, OutputFormat},
    settings::Settings,
    survey,
};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct PingArgs {
    #[command(flatten)]
    pub measure: MeasureArgs,

    /// Export probes that got no reply at all to this CSV file
    #[arg(long, value_name = "FILE")]
    pub failed: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

pub async fn handle<A: AtlasApi>(api: &A, settings: &Settings, args: PingArgs) -> Result<()> {
    let pings = survey::ping(api, settings, &args.measure.request()).await?;

    ExportOptions::from(&args.output).write(pings.samples.as_slice())?;

    if let Some(path) = args.failed {
        let options = ExportOptions {
            format: OutputFormat::Csv,
            output_file: Some(path),
        };
        options.write(pings.failed().as_slice())?;
    }
    Ok(())
}
