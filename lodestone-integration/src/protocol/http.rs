use crate::{
    error::TransportError,
    metric::{Field, Metric, Tag},
};
use bytes::Bytes;
use chrono::Utc;
use std::time::Duration;
use url::Url;

/// Public REST client used by poll-based venue integrations.
///
/// Every request carries an explicit deadline; construction fails if the
/// caller supplies a zero timeout. Responses are returned as raw status +
/// bytes so that venue adapters own payload interpretation, alongside a
/// request round-trip [`Metric`].
#[derive(Debug, Clone)]
pub struct RestClient {
    http_client: reqwest::Client,
}

impl RestClient {
    /// Construct a new [`RestClient`] with a client-wide default timeout and
    /// a cap on concurrent connections per host.
    pub fn new(default_timeout: Duration, max_connections_per_host: usize) -> Result<Self, TransportError> {
        if default_timeout.is_zero() {
            return Err(TransportError::Unsupported {
                entity: "RestClient",
                item: "zero default timeout".to_string(),
            });
        }

        let http_client = reqwest::Client::builder()
            .timeout(default_timeout)
            .pool_max_idle_per_host(max_connections_per_host)
            .build()?;

        Ok(Self { http_client })
    }

    /// Execute a GET against the provided [`Url`] with a per-request deadline.
    ///
    /// Measures and returns the HTTP request round trip duration.
    pub async fn get(
        &self,
        url: Url,
        timeout: Duration,
    ) -> Result<(reqwest::StatusCode, Bytes, Metric), TransportError> {
        let mut latency = Metric {
            name: "http_request_duration",
            time: Utc::now().timestamp_millis() as u64,
            tags: vec![
                Tag::new("http_method", "GET"),
                Tag::new("host", url.host_str().unwrap_or_default()),
                Tag::new("path", url.path()),
            ],
            fields: Vec::with_capacity(1),
        };

        let start = std::time::Instant::now();
        let response = self
            .http_client
            .get(url)
            .timeout(timeout)
            .send()
            .await?;
        let duration = start.elapsed().as_millis() as u64;

        latency
            .tags
            .push(Tag::new("status_code", response.status().as_str()));
        latency.fields.push(Field::new("duration", duration));

        let status_code = response.status();
        let payload = response.bytes().await?;

        Ok((status_code, payload, latency))
    }
}
