pub mod ping;
pub mod traceroute;

use crate::settings::Settings;
use anyhow::{Context, Result, bail};
use atlas_client::{
    AtlasApi, Error as AtlasError,
    types::{MeasurementDefinition, MeasurementRequest, Probe, ProbeFilter, ProbeRef},
};
use serde::de::DeserializeOwned;
use std::{collections::BTreeMap, time::Duration};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub use ping::{FailedProbe, PingMeasurement, PingSample};
pub use traceroute::{Hop, HopOutcome, Trace, TracerouteMeasurement};

/// Selected probes keyed by probe id
pub type ProbeIndex = BTreeMap<u64, Probe>;

/// A type of Atlas measurement together with the results parsed so far.
pub trait MeasurementKind {
    /// Raw record as served by the results endpoint
    type Record: DeserializeOwned + Send + 'static;

    const NAME: &'static str;

    fn definition(&self, target: &str) -> MeasurementDefinition;

    /// Parses one batch of records; `probes` is the selection the
    /// measurement ran on.
    fn flush(&mut self, records: Vec<Self::Record>, probes: &ProbeIndex);
}

/// Limits and timing of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementPlan {
    pub max_probes: usize,
    pub probes_per_measurement: usize,
    pub max_concurrent_measurements: usize,
    pub wait: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl MeasurementPlan {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_probes: settings.limits.max_probes,
            probes_per_measurement: settings.limits.probes_per_measurement,
            max_concurrent_measurements: settings.limits.max_concurrent_measurements,
            wait: Duration::from_secs(settings.measurement.wait_secs),
            poll_interval: Duration::from_secs(settings.measurement.poll_interval_secs),
            max_polls: settings.measurement.max_polls,
        }
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }
}

/// Which probes to measure from.
#[derive(Debug, Clone, Default)]
pub struct ProbeSelection {
    /// Two-letter country code to restrict the probe query to
    pub country: Option<String>,
    /// Upper bound on the number of probes, below the platform maximum
    pub limit: Option<usize>,
    /// Existing measurements to read results from instead of creating new ones
    pub measurement_ids: Vec<u64>,
    /// Already known probes; skips the probe query entirely
    pub probes: Option<Vec<Probe>>,
}

/// Splits probe ids into ordered batches of at most `size` ids.
pub fn chunk_probes(ids: &[u64], size: usize) -> Vec<Vec<u64>> {
    ids.chunks(size.max(1)).map(<[u64]>::to_vec).collect()
}

/// One measurement run toward a single target.
pub struct Measure<'a, A: AtlasApi, K: MeasurementKind> {
    api: &'a A,
    kind: K,
    target: String,
    plan: MeasurementPlan,
    probes: ProbeIndex,
    measurement_ids: Vec<u64>,
}

impl<'a, A: AtlasApi, K: MeasurementKind> Measure<'a, A, K> {
    /// Resolves the probe selection; no measurement is created yet.
    pub async fn prepare(
        api: &'a A,
        kind: K,
        target: &str,
        plan: MeasurementPlan,
        selection: ProbeSelection,
    ) -> Result<Self> {
        let probes = select_probes(api, &plan, &selection).await?;
        info!(
            host = target,
            kind = K::NAME,
            probes = probes.len(),
            "probe selection ready"
        );

        Ok(Self {
            api,
            kind,
            target: target.to_string(),
            plan,
            probes,
            measurement_ids: selection.measurement_ids,
        })
    }

    pub fn probes(&self) -> &ProbeIndex {
        &self.probes
    }

    pub fn measurement_ids(&self) -> &[u64] {
        &self.measurement_ids
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn into_kind(self) -> K {
        self.kind
    }

    /// Creates measurements unless existing ids were supplied, then collects
    /// and parses every result. Existing measurements are read once, without
    /// waiting or polling.
    pub async fn run(&mut self) -> Result<()> {
        if !self.measurement_ids.is_empty() {
            let ids = self.measurement_ids.clone();
            self.collect(&ids, false).await;
            return Ok(());
        }

        if self.probes.is_empty() {
            bail!("no probes matched the selection; nothing to measure");
        }

        let probe_ids: Vec<u64> = self.probes.keys().copied().collect();
        let batches = chunk_probes(&probe_ids, self.plan.probes_per_measurement);
        let waves = batches.len().div_ceil(self.plan.max_concurrent_measurements);
        if waves > 1 {
            info!(
                batches = batches.len(),
                waves,
                max_concurrent = self.plan.max_concurrent_measurements,
                "more batches than concurrent measurements allowed; launching in waves"
            );
        }

        for wave in batches.chunks(self.plan.max_concurrent_measurements) {
            let ids = self.launch(wave).await?;
            if ids.is_empty() {
                continue;
            }

            info!(wait = ?self.plan.wait, "waiting for measurement results");
            sleep(self.plan.wait).await;
            self.collect(&ids, true).await;
        }

        if self.measurement_ids.is_empty() {
            bail!("no {} measurement could be created", K::NAME);
        }

        Ok(())
    }

    async fn launch(&mut self, wave: &[Vec<u64>]) -> Result<Vec<u64>> {
        let mut created = Vec::new();

        for probe_ids in wave {
            let request = MeasurementRequest::one_off(self.kind.definition(&self.target), probe_ids);
            match self.api.create_measurement(&request).await {
                Ok(ids) => created.extend(ids),
                Err(AtlasError::MissingApiKey) => {
                    bail!("an Atlas API key is required to create measurements")
                }
                Err(err) => {
                    error!(error = %err, probes = probe_ids.len(), kind = K::NAME, "failed to create measurement");
                }
            }
        }

        info!(kind = K::NAME, ids = ?created, "Atlas measurement ids");
        self.measurement_ids.extend(&created);
        Ok(created)
    }

    /// A measurement whose results cannot be fetched is logged and skipped.
    async fn collect(&mut self, ids: &[u64], poll: bool) {
        for &id in ids {
            let max_polls = if poll { self.plan.max_polls } else { 0 };
            match self.poll_results(id, max_polls).await {
                Ok(records) => {
                    debug!(measurement_id = id, records = records.len(), "results received");
                    self.kind.flush(records, &self.probes);
                }
                Err(err) => {
                    error!(measurement_id = id, error = ?err, kind = K::NAME, "failed to fetch results");
                }
            }
        }
    }

    async fn poll_results(&self, id: u64, max_polls: u32) -> Result<Vec<K::Record>> {
        let mut polls = 0;
        loop {
            let records = self
                .api
                .fetch_results::<K::Record>(id)
                .await
                .with_context(|| format!("Failed to fetch results of measurement {id}"))?;

            if !records.is_empty() {
                return Ok(records);
            }
            if polls >= max_polls {
                warn!(measurement_id = id, polls, "measurement returned no results");
                return Ok(records);
            }

            polls += 1;
            info!(
                measurement_id = id,
                poll = polls,
                retry_in = ?self.plan.poll_interval,
                "no results yet"
            );
            sleep(self.plan.poll_interval).await;
        }
    }
}

async fn select_probes<A: AtlasApi>(
    api: &A,
    plan: &MeasurementPlan,
    selection: &ProbeSelection,
) -> Result<ProbeIndex> {
    let probes = if let Some(probes) = &selection.probes {
        probes.clone()
    } else if !selection.measurement_ids.is_empty() {
        let mut ids = Vec::new();
        for &measurement_id in &selection.measurement_ids {
            let refs = api
                .fetch_results::<ProbeRef>(measurement_id)
                .await
                .with_context(|| {
                    format!("Failed to fetch results of measurement {measurement_id}")
                })?;
            ids.extend(refs.into_iter().map(|r| r.prb_id));
        }
        ids.sort_unstable();
        ids.dedup();

        if ids.is_empty() {
            Vec::new()
        } else {
            api.fetch_probes(&ProbeFilter::by_ids(ids))
                .await
                .context("Failed to fetch probes of existing measurements")?
        }
    } else {
        let mut filter = ProbeFilter::connected_ipv4();
        if let Some(country) = &selection.country {
            filter = filter.with_country(country.as_str());
        }
        api.fetch_probes(&filter)
            .await
            .context("Failed to fetch probes")?
    };

    let mut index: ProbeIndex = probes.into_iter().map(|p| (p.id, p)).collect();

    if index.len() > plan.max_probes {
        warn!(
            "More than {} probes ({}), cut to {}",
            plan.max_probes,
            index.len(),
            plan.max_probes
        );
        index = index.into_iter().take(plan.max_probes).collect();
    }

    if let Some(limit) = selection.limit {
        if index.len() > limit {
            info!(limit, available = index.len(), "limiting probe selection");
            index = index.into_iter().take(limit).collect();
        }
    }

    Ok(index)
}
