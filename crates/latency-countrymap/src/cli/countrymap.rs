use super::{MeasureArgs, OutputArgs};
use anyhow::Result;
use atlas_client::AtlasApi;
use clap::Args;
use latency_countrymap::{
    export::ExportOptions,
    settings::Settings,
    survey::{self, SurveyRequest},
};
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug)]
pub struct CountrymapArgs {
    #[command(flatten)]
    pub measure: MeasureArgs,

    /// HTML file to write (defaults to countrymap_<TARGET>.html)
    #[arg(short = 'f', long, value_name = "FILE")]
    pub filename: Option<PathBuf>,

    /// Also export the per-country statistics
    #[arg(long)]
    pub stats: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

pub async fn handle<A: AtlasApi>(api: &A, settings: &Settings, args: CountrymapArgs) -> Result<()> {
    let request: SurveyRequest = args.measure.request();
    let path = args
        .filename
        .clone()
        .unwrap_or_else(|| request.default_map_path());

    let stats = survey::create_countrymap(api, settings, &request, &path).await?;
    info!(countries = stats.len(), path = %path.display(), "countrymap ready");

    if args.stats {
        ExportOptions::from(&args.output).write(&stats)?;
    }
    Ok(())
}
