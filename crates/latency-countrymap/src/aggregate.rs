use crate::measurement::PingSample;
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;

/// Country code -> mean rtt in whole milliseconds, capped at the display ceiling
pub type CountryLatencies = BTreeMap<String, u32>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryStats {
    pub probes: usize,
    pub mean_rtt_ms: f64,
    pub min_rtt_ms: f64,
    pub max_rtt_ms: f64,
}

impl CountryStats {
    /// Mean truncated to whole milliseconds and capped at `ceiling_ms`.
    pub fn capped_latency(&self, ceiling_ms: u32) -> u32 {
        (self.mean_rtt_ms as u32).min(ceiling_ms)
    }
}

/// Groups successful samples by probe country. Samples whose probe has no
/// country are dropped.
pub fn country_stats(samples: &[PingSample]) -> BTreeMap<String, CountryStats> {
    samples
        .iter()
        .filter_map(|sample| sample.country.clone().map(|country| (country, sample.rtt)))
        .into_group_map()
        .into_iter()
        .map(|(country, rtts)| {
            let total: f64 = rtts.iter().sum();
            let stats = CountryStats {
                probes: rtts.len(),
                mean_rtt_ms: total / rtts.len() as f64,
                min_rtt_ms: rtts.iter().copied().fold(f64::INFINITY, f64::min),
                max_rtt_ms: rtts.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };
            (country, stats)
        })
        .collect()
}

pub fn country_latencies(samples: &[PingSample], ceiling_ms: u32) -> CountryLatencies {
    country_stats(samples)
        .into_iter()
        .map(|(country, stats)| {
            let latency = stats.capped_latency(ceiling_ms);
            (country, latency)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(probe_id: u64, country: Option<&str>, rtt: f64) -> PingSample {
        PingSample {
            probe_id,
            src_ip: "192.0.2.1".to_string(),
            asn: None,
            country: country.map(str::to_string),
            lat: None,
            lon: None,
            rtt,
        }
    }

    #[test]
    fn test_country_latencies_mean_truncated_and_capped() {
        let samples = vec![
            sample(1, Some("NL"), 10.0),
            sample(2, Some("NL"), 15.9),
            sample(3, Some("AU"), 250.0),
            sample(4, Some("AU"), 310.0),
            sample(5, Some("JP"), 119.99),
            sample(6, None, 1.0),
        ];

        let latencies = country_latencies(&samples, 120);
        assert_eq!(
            latencies,
            BTreeMap::from([
                ("AU".to_string(), 120),
                ("JP".to_string(), 119),
                ("NL".to_string(), 12),
            ])
        );
    }

    #[test]
    fn test_country_stats() {
        let samples = vec![
            sample(1, Some("BR"), 30.0),
            sample(2, Some("BR"), 50.0),
            sample(3, Some("BR"), 40.0),
        ];

        let stats = country_stats(&samples);
        let br = &stats["BR"];
        assert_eq!(br.probes, 3);
        assert_eq!(br.mean_rtt_ms, 40.0);
        assert_eq!(br.min_rtt_ms, 30.0);
        assert_eq!(br.max_rtt_ms, 50.0);
    }

    #[test]
    fn test_empty_samples() {
        assert!(country_latencies(&[], 120).is_empty());
    }
}
