use crate::{
    aggregate::{CountryStats, country_stats},
    measurement::{
        Measure, MeasurementKind, MeasurementPlan, PingMeasurement, ProbeIndex, ProbeSelection,
        TracerouteMeasurement,
    },
    render::CountryMap,
    settings::Settings,
};
use anyhow::Result;
use atlas_client::{AtlasApi, types::Protocol};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{info, warn};

/// What to measure and from where.
#[derive(Debug, Clone, Default)]
pub struct SurveyRequest {
    pub target: String,
    pub country: Option<String>,
    pub probe_limit: Option<usize>,
    /// Overrides the configured wait before results are fetched
    pub wait: Option<Duration>,
    /// Read results of these measurements instead of creating new ones
    pub measurement_ids: Vec<u64>,
}

impl SurveyRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn plan(&self, settings: &Settings) -> MeasurementPlan {
        let plan = MeasurementPlan::from_settings(settings);
        match self.wait {
            Some(wait) => plan.with_wait(wait),
            None => plan,
        }
    }

    pub fn selection(&self) -> ProbeSelection {
        ProbeSelection {
            country: self.country.clone(),
            limit: self.probe_limit,
            measurement_ids: self.measurement_ids.clone(),
            probes: None,
        }
    }

    /// `countrymap_<target>.html`
    pub fn default_map_path(&self) -> PathBuf {
        PathBuf::from(format!("countrymap_{}.html", self.target))
    }
}

async fn measure<A: AtlasApi, K: MeasurementKind>(
    api: &A,
    settings: &Settings,
    request: &SurveyRequest,
    kind: K,
) -> Result<K> {
    let mut measure = Measure::prepare(
        api,
        kind,
        &request.target,
        request.plan(settings),
        request.selection(),
    )
    .await?;
    measure.run().await?;
    Ok(measure.into_kind())
}

pub async fn ping<A: AtlasApi>(
    api: &A,
    settings: &Settings,
    request: &SurveyRequest,
) -> Result<PingMeasurement> {
    let pings = measure(api, settings, request, PingMeasurement::default()).await?;

    if !pings.failed_probes.is_empty() {
        warn!(
            failed = pings.failed_probes.len(),
            probes = ?pings.failed_probes.keys().collect::<Vec<_>>(),
            "probes without a single ping reply"
        );
    }
    info!(
        host = %request.target,
        samples = pings.samples.len(),
        failed = pings.failed_probes.len(),
        "ping measurement complete"
    );

    Ok(pings)
}

pub async fn traceroute<A: AtlasApi>(
    api: &A,
    settings: &Settings,
    request: &SurveyRequest,
    protocol: Protocol,
) -> Result<TracerouteMeasurement> {
    let traces = measure(api, settings, request, TracerouteMeasurement::new(protocol)).await?;
    info!(
        host = %request.target,
        %protocol,
        traces = traces.traces.len(),
        incomplete = traces.incomplete().count(),
        "traceroute measurement complete"
    );
    Ok(traces)
}

/// Probes a run would measure from, without creating anything.
pub async fn probes<A: AtlasApi>(
    api: &A,
    settings: &Settings,
    request: &SurveyRequest,
) -> Result<ProbeIndex> {
    let measure = Measure::prepare(
        api,
        PingMeasurement::default(),
        &request.target,
        request.plan(settings),
        request.selection(),
    )
    .await?;
    Ok(measure.probes().clone())
}

/// Pings the target, aggregates per country and writes the map to `path`.
pub async fn create_countrymap<A: AtlasApi>(
    api: &A,
    settings: &Settings,
    request: &SurveyRequest,
    path: &Path,
) -> Result<BTreeMap<String, CountryStats>> {
    let pings = ping(api, settings, request).await?;

    let stats = country_stats(&pings.samples);
    if stats.is_empty() {
        warn!(host = %request.target, "no country has a successful sample; the map will be empty");
    }
    info!(countries = stats.len(), "aggregated latency per country");

    let title = format!("Latency to {}", request.target);
    CountryMap::new(&stats, &settings.map).save(path, &title)?;

    Ok(stats)
}
