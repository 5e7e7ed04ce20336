mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::{
    MeasureArgs, countrymap::CountrymapArgs, ping::PingArgs, probes::ProbesArgs, trace::TraceArgs,
};
use latency_countrymap::settings::Settings;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "latency-countrymap",
    about = "Measure latency toward a host from RIPE Atlas probes and map it per country",
    version,
    author,
    after_help = r#"Configuration:
    Configuration can be provided via:
    1. Environment variables with LATENCY_MAP__ prefix (e.g., LATENCY_MAP__ATLAS__API_KEY)
    2. .env file in the current directory
    3. Config file with --config option (see config.example.toml)

Examples:
    # Ping example.com from up to 500 probes and draw the map
    latency-countrymap countrymap example.com -k <KEY> -n 500

    # Map from probes in Brazil only, written to br.html
    latency-countrymap countrymap example.com -c BR -f br.html

    # Re-draw the map from measurements created earlier
    latency-countrymap countrymap example.com -m 61234567,61234568

    # Traceroutes over TCP that never reached the target, as CSV
    latency-countrymap trace example.com -P TCP --format csv -o traces.csv

    # Which probes would be used in Japan
    latency-countrymap probes example.com -c JP"#
)]
pub struct Cli {
    /// Path to the configuration file (TOML format)
    ///
    /// If not provided, will attempt to load from environment variables
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ping the target and render latency per country as an HTML map
    Countrymap(CountrymapArgs),
    /// Ping the target and export the per-probe samples
    Ping(PingArgs),
    /// Traceroute the target and export the hop lists
    Trace(TraceArgs),
    /// List the probes a measurement would run on
    Probes(ProbesArgs),
}

impl Commands {
    fn measure_args(&self) -> &MeasureArgs {
        match self {
            Self::Countrymap(args) => &args.measure,
            Self::Ping(args) => &args.measure,
            Self::Trace(args) => &args.measure,
            Self::Probes(args) => &args.measure,
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut settings = if let Some(config_path) = &self.config {
            Settings::from_path(config_path)?
        } else {
            Settings::from_env()?
        };
        if self.verbose {
            settings.log_level = "debug".to_string();
        }
        if let Some(key) = &self.command.measure_args().key {
            settings.atlas.api_key = Some(key.clone());
        }
        init_logging(&settings.log_level)?;
        debug!("{settings}");

        let api = settings.atlas_client()?;

        match self.command {
            Commands::Countrymap(args) => cli::countrymap::handle(&api, &settings, args).await,
            Commands::Ping(args) => cli::ping::handle(&api, &settings, args).await,
            Commands::Trace(args) => cli::trace::handle(&api, &settings, args).await,
            Commands::Probes(args) => cli::probes::handle(&api, &settings, args).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run().await
}

fn init_logging(log_level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
