use super::color::{ColorScale, NO_DATA_COLOR};
use crate::{aggregate::CountryStats, settings::MapSettings};
use anyhow::{Context, Result, bail};
use askama::Template;
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs::{self, create_dir_all},
    path::Path,
};
use tracing::info;

/// The page itself. Every `*_json` field is emitted verbatim into a
/// `<script>` element and must come from `script_json`.
#[derive(Template)]
#[template(path = "countrymap.html")]
struct CountryMapPage {
    title: String,
    data_json: String,
    legend_json: String,
    iso_properties_json: String,
    countries_json: String,
    no_data_color_json: String,
    tiles_url_json: String,
    tiles_attribution_json: String,
}

#[derive(Debug, Serialize)]
struct CountryEntry {
    latency: u32,
    mean_rtt_ms: f64,
    probes: usize,
    color: String,
}

/// Choropleth of per-country latency.
pub struct CountryMap<'a> {
    stats: &'a BTreeMap<String, CountryStats>,
    settings: &'a MapSettings,
    scale: ColorScale,
}

impl<'a> CountryMap<'a> {
    pub fn new(stats: &'a BTreeMap<String, CountryStats>, settings: &'a MapSettings) -> Self {
        let scale = ColorScale::stepped(
            0.0,
            f64::from(settings.latency_ceiling_ms),
            settings.color_steps,
        );
        Self {
            stats,
            settings,
            scale,
        }
    }

    /// Fill colour for an ISO 3166-1 alpha-2 code.
    pub fn fill_color(&self, iso: &str) -> String {
        match self.stats.get(iso) {
            Some(stats) => self
                .scale
                .color_for(f64::from(
                    stats.capped_latency(self.settings.latency_ceiling_ms),
                ))
                .hex(),
            None => NO_DATA_COLOR.to_string(),
        }
    }

    pub fn render(&self, title: &str) -> Result<String> {
        let data: BTreeMap<&str, CountryEntry> = self
            .stats
            .iter()
            .map(|(iso, stats)| {
                let entry = CountryEntry {
                    latency: stats.capped_latency(self.settings.latency_ceiling_ms),
                    mean_rtt_ms: (stats.mean_rtt_ms * 10.0).round() / 10.0,
                    probes: stats.probes,
                    color: self.fill_color(iso),
                };
                (iso.as_str(), entry)
            })
            .collect();

        let page = CountryMapPage {
            title: title.to_string(),
            data_json: script_json(&data)?,
            legend_json: script_json(&self.scale.legend())?,
            iso_properties_json: script_json(&self.settings.iso_properties)?,
            countries_json: script_json(&self.countries_source()?)?,
            no_data_color_json: script_json(NO_DATA_COLOR)?,
            tiles_url_json: script_json(&self.settings.tiles_url)?,
            tiles_attribution_json: script_json(&self.settings.tiles_attribution)?,
        };
        let html = page.render().context("Failed to render countrymap page")?;

        Ok(html)
    }

    pub fn save(&self, path: &Path, title: &str) -> Result<()> {
        let html = self.render(title)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }
        fs::write(path, html).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Countrymap written to: {}", path.display());
        Ok(())
    }

    /// A URL string for the page to fetch, or the parsed local file to inline.
    fn countries_source(&self) -> Result<Value> {
        let source = &self.settings.countries_geojson;
        if source.starts_with("http://") || source.starts_with("https://") {
            return Ok(Value::String(source.clone()));
        }

        let raw = fs::read_to_string(source)
            .with_context(|| format!("Failed to read countries GeoJSON from {source}"))?;
        let geojson: Value = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse countries GeoJSON from {source}"))?;
        if geojson.get("features").and_then(Value::as_array).is_none() {
            bail!("{source} is not a GeoJSON FeatureCollection");
        }
        Ok(geojson)
    }
}

/// JSON safe to embed in a `<script>` element.
fn script_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}
