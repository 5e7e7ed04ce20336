use crate::settings::Settings;
use anyhow::{Result, bail};

/// Validate the configuration values
pub fn validate_config(settings: &Settings) -> Result<()> {
    // Validate log level
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&settings.log_level.to_lowercase().as_str()) {
        bail!(
            "Invalid log level '{}'. Valid options are: {:?}",
            settings.log_level,
            valid_log_levels
        );
    }

    // Validate Atlas settings
    if settings.atlas.base_url.is_empty() {
        bail!("Atlas base URL cannot be empty");
    }

    if !settings.atlas.base_url.starts_with("http://")
        && !settings.atlas.base_url.starts_with("https://")
    {
        bail!("Atlas base URL must start with http:// or https://");
    }

    if settings.atlas.timeout_secs == 0 {
        bail!("Atlas timeout_secs must be greater than 0");
    }

    // Validate limits
    let limits = &settings.limits;
    if limits.max_probes == 0 {
        bail!("limits.max_probes must be greater than 0");
    }

    if limits.probes_per_measurement == 0 {
        bail!("limits.probes_per_measurement must be greater than 0");
    }

    if limits.probes_per_measurement > limits.max_probes {
        bail!(
            "limits.probes_per_measurement ({}) cannot exceed limits.max_probes ({})",
            limits.probes_per_measurement,
            limits.max_probes
        );
    }

    if limits.max_concurrent_measurements == 0 {
        bail!("limits.max_concurrent_measurements must be greater than 0");
    }

    // Validate polling
    if settings.measurement.max_polls > 0 && settings.measurement.poll_interval_secs == 0 {
        bail!("measurement.poll_interval_secs must be greater than 0 when polling is enabled");
    }

    // Validate map settings
    if settings.map.latency_ceiling_ms == 0 {
        bail!("map.latency_ceiling_ms must be greater than 0");
    }

    if settings.map.color_steps == 0 {
        bail!("map.color_steps must be greater than 0");
    }

    if settings.map.countries_geojson.is_empty() {
        bail!("map.countries_geojson cannot be empty");
    }

    if settings.map.iso_properties.is_empty() {
        bail!("map.iso_properties must name at least one feature property");
    }

    if let Some(backoff) = &settings.backoff {
        if backoff.min_delay_ms > backoff.max_delay_ms {
            bail!(
                "backoff.min_delay_ms ({}) cannot exceed backoff.max_delay_ms ({})",
                backoff.min_delay_ms,
                backoff.max_delay_ms
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::BackoffSettings;

    fn create_valid_config() -> Settings {
        let mut settings = Settings::default();
        settings.atlas.api_key = Some("key".to_string());
        settings
    }

    #[test]
    fn test_valid_config() {
        let config = create_valid_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = create_valid_config();

        config.atlas.base_url = "".to_string();
        assert!(validate_config(&config).is_err());

        config.atlas.base_url = "atlas.ripe.net/api/v2".to_string();
        assert!(validate_config(&config).is_err());

        config.atlas.base_url = "http://localhost:8080/api/v2".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_limits() {
        let mut config = create_valid_config();
        config.limits.max_probes = 0;
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.limits.probes_per_measurement = 0;
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.limits.max_probes = 50;
        config.limits.probes_per_measurement = 100;
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.limits.max_concurrent_measurements = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = create_valid_config();
        config.log_level = "invalid".to_string();
        assert!(validate_config(&config).is_err());

        config.log_level = "DEBUG".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_map_settings() {
        let mut config = create_valid_config();
        config.map.latency_ceiling_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.map.color_steps = 0;
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.map.iso_properties.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_polling_requires_interval() {
        let mut config = create_valid_config();
        config.measurement.poll_interval_secs = 0;
        assert!(validate_config(&config).is_err());

        config.measurement.max_polls = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_backoff_delays_ordered() {
        let mut config = create_valid_config();
        config.backoff = Some(BackoffSettings {
            factor: 2.0,
            min_delay_ms: 5_000,
            max_delay_ms: 1_000,
            max_times: 3,
        });
        assert!(validate_config(&config).is_err());
    }
}
