use atlas_client::{
    Error as AtlasError, MockAtlasApi,
    types::{PingRecord, Point, Probe},
};
use latency_countrymap::{
    export::{Exportable, OutputFormat},
    settings::Settings,
    survey::{self, SurveyRequest},
};
use std::{fs, io::Write};

fn probe(id: u64, country: &str) -> Probe {
    Probe {
        id,
        address_v4: Some(format!("192.0.2.{id}")),
        asn_v4: Some(64_496),
        country_code: Some(country.to_string()),
        geometry: Some(Point::new(5.0, 52.0)),
        status: None,
    }
}

fn ping(prb_id: u64, min: f64) -> PingRecord {
    PingRecord {
        prb_id,
        from: format!("192.0.2.{prb_id}"),
        dst_addr: Some("198.51.100.1".to_string()),
        min,
        avg: None,
        max: None,
    }
}

fn settings_with_local_countries(dir: &tempfile::TempDir) -> Settings {
    let countries = dir.path().join("countries.geojson");
    let mut file = fs::File::create(&countries).unwrap();
    write!(
        file,
        r#"{{"type": "FeatureCollection", "features": [
            {{"type": "Feature", "properties": {{"ISO_A2": "NL", "NAME": "Netherlands"}}, "geometry": null}},
            {{"type": "Feature", "properties": {{"ISO_A2": "-99", "ISO_A2_EH": "FR", "NAME": "France"}}, "geometry": null}}
        ]}}"#
    )
    .unwrap();

    let mut settings = Settings::default();
    settings.measurement.wait_secs = 0;
    settings.measurement.poll_interval_secs = 0;
    settings.limits.probes_per_measurement = 2;
    settings.map.countries_geojson = countries.to_string_lossy().to_string();
    settings
}

#[tokio::test]
async fn test_countrymap_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_with_local_countries(&dir);

    let mut api = MockAtlasApi::new();
    api.expect_fetch_probes()
        .times(1)
        .returning(|_| Ok(vec![probe(1, "NL"), probe(2, "NL"), probe(3, "JP")]));
    api.expect_create_measurement()
        .times(2)
        .returning(|request| Ok(vec![request.probes[0].requested as u64]));
    api.expect_fetch_results::<PingRecord>()
        .times(2)
        .returning(|id| {
            Ok(match id {
                2 => vec![ping(1, 8.0), ping(2, 13.0)],
                _ => vec![ping(3, -1.0)],
            })
        });

    let request = SurveyRequest::new("example.com");
    let path = dir.path().join(request.default_map_path());
    let stats = survey::create_countrymap(&api, &settings, &request, &path)
        .await
        .unwrap();

    assert_eq!(stats.len(), 1);
    assert_eq!(stats["NL"].probes, 2);
    assert_eq!(stats["NL"].mean_rtt_ms, 10.5);

    let html = fs::read_to_string(&path).unwrap();
    assert!(html.contains("<title>Latency to example.com</title>"));
    assert!(html.contains(r#""NL":{"latency":10,"#));
    assert!(html.contains("Netherlands"));
    assert!(!html.contains(r#""JP":"#));

    let table = stats.export(OutputFormat::Table).unwrap();
    assert!(table.contains("NL"));
    assert!(table.contains("10.500"));
}

#[tokio::test]
async fn test_countrymap_from_existing_measurements() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_with_local_countries(&dir);

    let mut api = MockAtlasApi::new();
    api.expect_create_measurement().never();
    api.expect_fetch_results::<atlas_client::types::ProbeRef>()
        .times(1)
        .returning(|_| {
            Ok(vec![
                atlas_client::types::ProbeRef { prb_id: 5 },
                atlas_client::types::ProbeRef { prb_id: 6 },
            ])
        });
    api.expect_fetch_probes()
        .withf(|filter| filter.ids == vec![5, 6])
        .times(1)
        .returning(|_| Ok(vec![probe(5, "FR"), probe(6, "FR")]));
    api.expect_fetch_results::<PingRecord>()
        .times(1)
        .returning(|_| Ok(vec![ping(5, 300.0), ping(6, 200.0)]));

    let request = SurveyRequest {
        measurement_ids: vec![4242],
        ..SurveyRequest::new("example.com")
    };
    let path = dir.path().join("fr.html");
    let stats = survey::create_countrymap(&api, &settings, &request, &path)
        .await
        .unwrap();

    assert_eq!(stats["FR"].capped_latency(settings.map.latency_ceiling_ms), 120);
    let html = fs::read_to_string(&path).unwrap();
    assert!(html.contains(r##""FR":{"latency":120,"mean_rtt_ms":250.0,"probes":2,"color":"#ff0000"}"##));
}

#[tokio::test]
async fn test_countrymap_requires_api_key_for_new_measurements() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_with_local_countries(&dir);

    let mut api = MockAtlasApi::new();
    api.expect_fetch_probes()
        .returning(|_| Ok(vec![probe(1, "NL")]));
    api.expect_create_measurement()
        .returning(|_| Err(AtlasError::MissingApiKey));

    let path = dir.path().join("none.html");
    let result = survey::create_countrymap(
        &api,
        &settings,
        &SurveyRequest::new("example.com"),
        &path,
    )
    .await;

    assert!(result.is_err());
    assert!(!path.exists());
}
