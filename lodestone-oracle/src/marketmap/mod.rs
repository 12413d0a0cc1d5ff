use crate::{error::OracleError, market::MarketMap, registry::Registry};
use async_trait::async_trait;
use lodestone_integration::{error::TransportError, protocol::http::RestClient};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::watch;
use tracing::{debug, error, warn};
use url::Url;

/// Shared conversion from chain market params and venue display names into
/// the canonical model.
pub mod convert;

/// Composition of the mainnet and research sources, including CMC-only mode.
pub mod multi;

/// Research JSON interpretation.
pub mod research;

/// Embedded static CoinMarketCap market map.
pub mod static_cmc;

/// A source of authoritative market maps.
#[async_trait]
pub trait MarketMapSource
where
    Self: Debug + Send + Sync,
{
    async fn fetch(&self) -> Result<MarketMap, OracleError>;
}

/// Wire shape served by an HTTPS market-map endpoint.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceShape {
    /// `{ "markets": { "BASE/QUOTE": Market, ... } }` - the mainnet shape,
    /// also served by a local node's marketmap module endpoint.
    Markets,
    /// `{ "market_params": [...] }` - the chain's market params query shape.
    MarketParams,
    /// The research JSON shape.
    Research,
}

/// HTTPS JSON market-map source.
#[derive(Debug)]
pub struct HttpMarketMapSource {
    client: RestClient,
    url: Url,
    shape: SourceShape,
    timeout: Duration,
    /// Only meaningful for [`SourceShape::Research`].
    cmc_only: bool,
}

impl HttpMarketMapSource {
    pub fn new(
        url: &str,
        shape: SourceShape,
        timeout: Duration,
        cmc_only: bool,
    ) -> Result<Self, OracleError> {
        Ok(Self {
            client: RestClient::new(timeout, 2)?,
            url: Url::parse(url).map_err(TransportError::UrlParse)?,
            shape,
            timeout,
            cmc_only,
        })
    }

    fn decode(&self, body: &[u8]) -> Result<MarketMap, OracleError> {
        let undecodable = |error: serde_json::Error| {
            OracleError::Transport(TransportError::DeserialiseJson {
                error,
                payload: String::from_utf8_lossy(body).into_owned(),
            })
        };

        match self.shape {
            SourceShape::Markets => serde_json::from_slice::<MarketMap>(body).map_err(undecodable),
            SourceShape::MarketParams => {
                let params = serde_json::from_slice(body).map_err(undecodable)?;
                Ok(convert::market_params_to_market_map(&params)?)
            }
            SourceShape::Research => {
                let research = serde_json::from_slice(body).map_err(undecodable)?;
                Ok(research::research_to_market_map(&research, self.cmc_only)?)
            }
        }
    }
}

#[async_trait]
impl MarketMapSource for HttpMarketMapSource {
    async fn fetch(&self) -> Result<MarketMap, OracleError> {
        let (status, body, _) = self.client.get(self.url.clone(), self.timeout).await?;

        if !status.is_success() {
            return Err(OracleError::Transport(TransportError::HttpResponse(
                status,
                String::from_utf8_lossy(&body).into_owned(),
            )));
        }

        self.decode(&body)
    }
}

fn default_update_interval_ms() -> u64 {
    30_000
}

fn default_source_timeout_ms() -> u64 {
    10_000
}

/// Where the authoritative market map comes from.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum MarketMapMode {
    /// A local node's marketmap module endpoint - the single source of truth
    /// when available.
    LocalNode { url: String },
    /// One external HTTPS source serving the mainnet shape.
    Mainnet { url: String },
    /// Mainnet plus the research overlay, optionally reduced to CMC-only.
    Research {
        mainnet_url: String,
        research_url: String,
        #[serde(default)]
        cmc_only: bool,
    },
}

/// Market-map resolver configuration.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct MarketMapConfig {
    #[serde(flatten)]
    pub mode: MarketMapMode,

    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    #[serde(default = "default_source_timeout_ms")]
    pub timeout_ms: u64,
}

impl MarketMapConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), OracleError> {
        if self.update_interval_ms == 0 || self.timeout_ms == 0 {
            return Err(OracleError::Config(
                "market map config has a zero interval or timeout".to_string(),
            ));
        }
        Ok(())
    }
}

/// Health of the resolver, exported through the RPC health endpoint.
///
/// A failed fetch or a failed validation marks the resolver unhealthy but
/// leaves the previously installed map serving; it never crashes the process.
#[derive(Debug, Default)]
pub struct ResolverHealth {
    healthy: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl ResolverHealth {
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn mark_healthy(&self) {
        self.healthy.store(true, Ordering::Relaxed);
        *self.last_error.lock() = None;
    }

    fn mark_unhealthy(&self, detail: String) {
        self.healthy.store(false, Ordering::Relaxed);
        *self.last_error.lock() = Some(detail);
    }
}

/// Fetch strategy assembled from a [`MarketMapConfig`].
#[derive(Debug)]
enum ResolverSource {
    Single(HttpMarketMapSource),
    Composed(multi::ResearchMarketMapFetcher<HttpMarketMapSource, HttpMarketMapSource>),
}

impl ResolverSource {
    async fn fetch(&self) -> Result<MarketMap, OracleError> {
        match self {
            ResolverSource::Single(source) => {
                let mut map = source.fetch().await?;
                map.validate()?;
                Ok(map)
            }
            ResolverSource::Composed(fetcher) => fetcher.fetch().await,
        }
    }
}

/// Maintains "the current authoritative market map": periodically fetches
/// from the configured source, validates, and installs into the [`Registry`].
///
/// Every successful install that changes the map bumps the epoch watch so
/// the engine can restart the provider runtimes whose assignments changed.
#[derive(Debug)]
pub struct Resolver {
    config: MarketMapConfig,
    source: ResolverSource,
    registry: Arc<Registry>,
    health: Arc<ResolverHealth>,
    epoch_tx: watch::Sender<u64>,
}

impl Resolver {
    pub fn new(
        config: MarketMapConfig,
        registry: Arc<Registry>,
        health: Arc<ResolverHealth>,
        epoch_tx: watch::Sender<u64>,
    ) -> Result<Self, OracleError> {
        config.validate()?;

        let timeout = config.timeout();
        let source = match &config.mode {
            MarketMapMode::LocalNode { url } | MarketMapMode::Mainnet { url } => {
                ResolverSource::Single(HttpMarketMapSource::new(
                    url,
                    SourceShape::Markets,
                    timeout,
                    false,
                )?)
            }
            MarketMapMode::Research {
                mainnet_url,
                research_url,
                cmc_only,
            } => ResolverSource::Composed(multi::ResearchMarketMapFetcher::new(
                HttpMarketMapSource::new(mainnet_url, SourceShape::Markets, timeout, false)?,
                HttpMarketMapSource::new(research_url, SourceShape::Research, timeout, *cmc_only)?,
                *cmc_only,
            )),
        };

        Ok(Self {
            config,
            source,
            registry,
            health,
            epoch_tx,
        })
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.update_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("market map resolver shutting down");
                        break;
                    }
                }
                _ = interval.tick() => self.resolve_once().await,
            }
        }
    }

    /// One fetch-validate-install cycle. Public so startup can perform the
    /// initial install before providers spawn.
    pub async fn resolve_once(&self) {
        let map = match self.source.fetch().await {
            Ok(map) => map,
            Err(error) => {
                warn!(%error, "market map fetch failed, keeping installed map");
                self.health.mark_unhealthy(error.to_string());
                return;
            }
        };

        let before = self.registry.snapshot();
        match self.registry.install(map) {
            Ok(()) => {
                self.health.mark_healthy();
                let after = self.registry.snapshot();
                if *before != *after {
                    self.epoch_tx.send_modify(|epoch| *epoch += 1);
                }
            }
            Err(error) => {
                error!(%error, "market map failed validation, keeping installed map");
                self.health.mark_unhealthy(error.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_map_config_modes_deserialise() {
        let local = serde_json::from_str::<MarketMapConfig>(
            r#"{"mode": "local_node", "url": "http://127.0.0.1:1317/marketmap"}"#,
        )
        .unwrap();
        assert!(matches!(local.mode, MarketMapMode::LocalNode { .. }));
        assert_eq!(local.update_interval_ms, 30_000);

        let research = serde_json::from_str::<MarketMapConfig>(
            r#"
            {
                "mode": "research",
                "mainnet_url": "https://example.com/mainnet.json",
                "research_url": "https://example.com/research.json",
                "cmc_only": true,
                "update_interval_ms": 60000
            }
            "#,
        )
        .unwrap();
        match &research.mode {
            MarketMapMode::Research { cmc_only, .. } => assert!(*cmc_only),
            other => panic!("expected research mode, got: {other:?}"),
        }
        assert_eq!(research.update_interval_ms, 60_000);
    }

    #[test]
    fn test_resolver_health_transitions() {
        let health = ResolverHealth::default();
        assert!(!health.is_healthy());

        health.mark_healthy();
        assert!(health.is_healthy());
        assert_eq!(health.last_error(), None);

        health.mark_unhealthy("mainnet unreachable".to_string());
        assert!(!health.is_healthy());
        assert_eq!(
            health.last_error(),
            Some("mainnet unreachable".to_string())
        );
    }
}
