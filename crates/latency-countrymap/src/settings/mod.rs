pub mod validation;

use anyhow::{Context, Result};
use atlas_client::{AtlasClient, DEFAULT_BASE_URL, types::Protocol};
use backon::ExponentialBuilder;
use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, time::Duration};
use validation::validate_config;

/// Prefix for environment overrides, e.g. `LATENCY_MAP__ATLAS__API_KEY`
pub const ENV_PREFIX: &str = "LATENCY_MAP";

/// Main settings configuration for latency-countrymap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level for application logging (e.g., "info", "debug", "warn", "error")
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Atlas API endpoint and credentials
    #[serde(default)]
    pub atlas: AtlasSettings,
    /// Platform limits applied when batching probes
    #[serde(default)]
    pub limits: LimitSettings,
    /// Waiting and polling for asynchronous results
    #[serde(default)]
    pub measurement: MeasurementSettings,
    /// Choropleth rendering
    #[serde(default)]
    pub map: MapSettings,
    /// Retry policy for Atlas API calls (optional)
    #[serde(default)]
    pub backoff: Option<BackoffSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasSettings {
    pub base_url: String,
    /// Required to create measurements; not needed for probe listings or
    /// results of public measurements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Per-request HTTP timeout
    pub timeout_secs: u64,
}

/// Limits imposed by the Atlas platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Probes per request
    pub max_probes: usize,
    /// Probes per single measurement
    pub probes_per_measurement: usize,
    /// Measurements running toward one target at the same time
    pub max_concurrent_measurements: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementSettings {
    /// Seconds to sleep after launching measurements before fetching results
    pub wait_secs: u64,
    /// Seconds between polls when a measurement has no results yet
    pub poll_interval_secs: u64,
    /// Extra polls before giving up on a measurement with no results
    pub max_polls: u32,
    /// Traceroute protocol
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapSettings {
    /// Latencies above this are drawn with the top colour
    pub latency_ceiling_ms: u32,
    /// Number of bins in the colour scale
    pub color_steps: usize,
    /// URL or local path of a GeoJSON FeatureCollection of countries
    pub countries_geojson: String,
    /// Feature properties holding the ISO 3166-1 alpha-2 code, tried in order
    pub iso_properties: Vec<String>,
    pub tiles_url: String,
    pub tiles_attribution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffSettings {
    #[serde(default = "default_backoff_factor")]
    pub factor: f32,
    #[serde(default = "default_backoff_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_backoff_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_max_times")]
    pub max_times: usize,
}

impl BackoffSettings {
    pub fn min_delay_duration(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay_duration(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Settings {
    /// Load configuration from a specific config file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        // env vars take priority over the file
        let settings = ConfigBuilder::builder()
            .add_source(File::with_name(&path.as_ref().to_string_lossy()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        validate_config(&settings)?;

        Ok(settings)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        // NOTE: It's ok if this fails (file might not exist)
        let _ = dotenvy::dotenv();

        let settings: Settings = ConfigBuilder::builder()
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        validate_config(&settings)?;

        Ok(settings)
    }

    pub fn backoff(&self) -> ExponentialBuilder {
        match &self.backoff {
            None => atlas_client::default_backoff(),
            Some(bs) => ExponentialBuilder::default()
                .with_jitter()
                .with_factor(bs.factor)
                .with_max_times(bs.max_times)
                .with_min_delay(bs.min_delay_duration())
                .with_max_delay(bs.max_delay_duration()),
        }
    }

    pub fn atlas_client(&self) -> Result<AtlasClient> {
        let client = AtlasClient::new(
            &self.atlas.base_url,
            self.atlas.api_key.clone(),
            Duration::from_secs(self.atlas.timeout_secs),
        )
        .context("Failed to build Atlas client")?
        .with_backoff(self.backoff());
        Ok(client)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            atlas: AtlasSettings::default(),
            limits: LimitSettings::default(),
            measurement: MeasurementSettings::default(),
            map: MapSettings::default(),
            backoff: None,
        }
    }
}

impl Default for AtlasSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_probes: 10_000,
            probes_per_measurement: 1_000,
            max_concurrent_measurements: 10,
        }
    }
}

impl Default for MeasurementSettings {
    fn default() -> Self {
        Self {
            wait_secs: 180,
            poll_interval_secs: 60,
            max_polls: 3,
            protocol: Protocol::Icmp,
        }
    }
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            latency_ceiling_ms: 120,
            color_steps: 6,
            countries_geojson: "https://raw.githubusercontent.com/nvkelso/natural-earth-vector/master/geojson/ne_50m_admin_0_countries.geojson".to_string(),
            iso_properties: vec![
                "ISO_A2_EH".to_string(),
                "ISO_A2".to_string(),
                "iso_a2".to_string(),
            ],
            tiles_url: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            tiles_attribution: "&copy; OpenStreetMap contributors".to_string(),
        }
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings {{\n\
             \tLog Level: {}\n\
             \tAtlas URL: {}\n\
             \tAPI Key: {}\n\
             \tMax Probes: {}\n\
             \tProbes Per Measurement: {}\n\
             \tMax Concurrent Measurements: {}\n\
             \tWait: {}s\n\
             \tLatency Ceiling: {}ms\n\
             }}",
            self.log_level,
            self.atlas.base_url,
            if self.atlas.api_key.is_some() { "set" } else { "unset" },
            self.limits.max_probes,
            self.limits.probes_per_measurement,
            self.limits.max_concurrent_measurements,
            self.measurement.wait_secs,
            self.map.latency_ceiling_ms,
        )
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backoff_factor() -> f32 {
    2.0
}

fn default_backoff_min_delay_ms() -> u64 {
    1000 // 1s
}

fn default_backoff_max_delay_ms() -> u64 {
    30 * 1000 // 30s
}

fn default_backoff_max_times() -> usize {
    5
}
