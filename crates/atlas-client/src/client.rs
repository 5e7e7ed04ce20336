use crate::{
    error::{Error, Result, default_backoff, with_retry},
    types::{MeasurementCreated, MeasurementRequest, Page, Probe, ProbeFilter},
};
use async_trait::async_trait;
use backon::ExponentialBuilder;
use mockall::automock;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://atlas.ripe.net/api/v2/";

const PROBES_PAGE_SIZE: u32 = 500;

// Keeps `id__in` query strings well below common URL length limits
const IDS_PER_PROBE_QUERY: usize = 500;

#[automock]
#[async_trait]
pub trait AtlasApi: Send + Sync {
    /// All probes matching `filter`, across every page.
    async fn fetch_probes(&self, filter: &ProbeFilter) -> Result<Vec<Probe>>;

    /// Creates the measurement and returns the ids Atlas assigned to it.
    async fn create_measurement(&self, request: &MeasurementRequest) -> Result<Vec<u64>>;

    async fn fetch_results<T: DeserializeOwned + Send + 'static>(
        &self,
        measurement_id: u64,
    ) -> Result<Vec<T>>;
}

#[derive(Debug, Clone)]
pub struct AtlasClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    backoff: ExponentialBuilder,
}

impl AtlasClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("atlas-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.filter(|key| !key.is_empty()),
            backoff: default_backoff(),
        })
    }

    pub fn with_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(reqwest::header::AUTHORIZATION, format!("Key {key}")),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(%url, "GET");
        let response = self.authorize(self.http.get(url)).send().await?;
        decode(response).await
    }

    async fn fetch_probe_pages(&self, filter: &ProbeFilter) -> Result<Vec<Probe>> {
        let mut url = self.endpoint("probes/")?;
        url.query_pairs_mut()
            .extend_pairs(filter.query_pairs())
            .append_pair("page_size", &PROBES_PAGE_SIZE.to_string());

        let mut probes = Vec::new();
        let mut next = Some(url);
        while let Some(page_url) = next.take() {
            let page: Page<Probe> = with_retry(
                || async { self.get_json(page_url.clone()).await },
                &self.backoff,
                "fetch_probes",
            )
            .await?;

            debug!(count = page.count, received = page.results.len(), "probe page");
            probes.extend(page.results);
            next = page.next.as_deref().map(Url::parse).transpose()?;
        }

        Ok(probes)
    }
}

#[async_trait]
impl AtlasApi for AtlasClient {
    async fn fetch_probes(&self, filter: &ProbeFilter) -> Result<Vec<Probe>> {
        if filter.ids.len() <= IDS_PER_PROBE_QUERY {
            return self.fetch_probe_pages(filter).await;
        }

        let mut probes = Vec::with_capacity(filter.ids.len());
        for ids in filter.ids.chunks(IDS_PER_PROBE_QUERY) {
            let chunk_filter = ProbeFilter {
                ids: ids.to_vec(),
                ..filter.clone()
            };
            probes.extend(self.fetch_probe_pages(&chunk_filter).await?);
        }
        Ok(probes)
    }

    async fn create_measurement(&self, request: &MeasurementRequest) -> Result<Vec<u64>> {
        if self.api_key.is_none() {
            return Err(Error::MissingApiKey);
        }
        let url = self.endpoint("measurements/")?;

        let created: MeasurementCreated = with_retry(
            || async {
                let response = self
                    .authorize(self.http.post(url.clone()))
                    .json(request)
                    .send()
                    .await?;
                decode(response).await
            },
            &self.backoff,
            "create_measurement",
        )
        .await?;

        info!(ids = ?created.measurements, "measurement created");
        Ok(created.measurements)
    }

    async fn fetch_results<T: DeserializeOwned + Send + 'static>(
        &self,
        measurement_id: u64,
    ) -> Result<Vec<T>> {
        let mut url = self.endpoint(&format!("measurements/{measurement_id}/results/"))?;
        url.query_pairs_mut().append_pair("format", "json");

        with_retry(
            || async { self.get_json(url.clone()).await },
            &self.backoff,
            "fetch_results",
        )
        .await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(Error::from_response(status, &body));
    }
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MeasurementDefinition, PingRecord};
    use mockito::Matcher;

    fn test_client(server: &mockito::ServerGuard, api_key: Option<&str>) -> AtlasClient {
        AtlasClient::new(
            &format!("{}/api/v2", server.url()),
            api_key.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_backoff(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(5))
                .with_max_times(2),
        )
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let client =
            AtlasClient::new("https://atlas.example/api/v2", None, Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url().as_str(), "https://atlas.example/api/v2/");
        assert_eq!(
            client.endpoint("probes/").unwrap().as_str(),
            "https://atlas.example/api/v2/probes/"
        );
    }

    #[tokio::test]
    async fn fetch_probes_follows_pagination() {
        let mut server = mockito::Server::new_async().await;
        let client = test_client(&server, None);
        let next = format!("{}/api/v2/probes/?page=2", server.url());

        let first = server
            .mock("GET", "/api/v2/probes/")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("country_code".into(), "DE".into()),
                Matcher::UrlEncoded("status".into(), "1".into()),
                Matcher::UrlEncoded("tags".into(), "system-ipv4-works".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"count": 2, "next": "{next}", "results": [{{"id": 1, "country_code": "DE"}}]}}"#
            ))
            .create_async()
            .await;
        let second = server
            .mock("GET", "/api/v2/probes/")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"count": 2, "next": null, "results": [{"id": 2, "country_code": "DE"}]}"#)
            .create_async()
            .await;

        let probes = client
            .fetch_probes(&ProbeFilter::connected_ipv4().with_country("de"))
            .await
            .unwrap();

        assert_eq!(probes.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn create_measurement_requires_key() {
        let server = mockito::Server::new_async().await;
        let client = test_client(&server, None);
        let request = MeasurementRequest::one_off(MeasurementDefinition::ping("example.com"), &[1]);

        let err = client.create_measurement(&request).await.unwrap_err();
        assert!(matches!(err, Error::MissingApiKey));
    }

    #[tokio::test]
    async fn create_measurement_sends_key_and_body() {
        let mut server = mockito::Server::new_async().await;
        let client = test_client(&server, Some("secret"));

        let mock = server
            .mock("POST", "/api/v2/measurements/")
            .match_header("authorization", "Key secret")
            .match_body(Matcher::PartialJsonString(
                r#"{"is_oneoff": true, "probes": [{"type": "probes", "value": "5,6", "requested": 2}]}"#
                    .to_string(),
            ))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"measurements": [4242]}"#)
            .create_async()
            .await;

        let request =
            MeasurementRequest::one_off(MeasurementDefinition::ping("example.com"), &[5, 6]);
        let ids = client.create_measurement(&request).await.unwrap();

        assert_eq!(ids, vec![4242]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_measurement_surfaces_api_error() {
        let mut server = mockito::Server::new_async().await;
        let client = test_client(&server, Some("secret"));

        let mock = server
            .mock("POST", "/api/v2/measurements/")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": {"status": 400, "detail": "Too many measurements to target"}}"#)
            .expect(1)
            .create_async()
            .await;

        let request = MeasurementRequest::one_off(MeasurementDefinition::ping("example.com"), &[1]);
        let err = client.create_measurement(&request).await.unwrap_err();

        match err {
            Error::Api { status, detail } => {
                assert_eq!(status, 400);
                assert_eq!(detail, "Too many measurements to target");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_results_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let client = test_client(&server, None);

        let failing = server
            .mock("GET", "/api/v2/measurements/77/results/")
            .match_query(Matcher::UrlEncoded("format".into(), "json".into()))
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let result = client.fetch_results::<PingRecord>(77).await;
        // one initial call plus two retries
        assert!(matches!(result, Err(Error::Api { status: 503, .. })));
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_results_decodes_records() {
        let mut server = mockito::Server::new_async().await;
        let client = test_client(&server, None);

        let mock = server
            .mock("GET", "/api/v2/measurements/77/results/")
            .match_query(Matcher::UrlEncoded("format".into(), "json".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"prb_id": 1, "from": "192.0.2.1", "min": 12.5},
                    {"prb_id": 2, "from": "192.0.2.2", "min": -1}]"#,
            )
            .create_async()
            .await;

        let records = client.fetch_results::<PingRecord>(77).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].min, 12.5);
        assert!(records[1].is_failure());
        mock.assert_async().await;
    }
}
