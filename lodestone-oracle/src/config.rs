use crate::{
    error::OracleError,
    marketmap::MarketMapConfig,
    provider::ProviderSpec,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, net::SocketAddr, path::Path, time::Duration};

fn default_aggregation_interval_ms() -> u64 {
    1_000
}

fn default_observation_staleness_ms() -> u64 {
    30_000
}

fn default_max_price_age_ms() -> u64 {
    120_000
}

fn default_rpc_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_listen_address() -> String {
    "127.0.0.1:8002".to_string()
}

/// The single configuration document for the oracle side-car.
///
/// Startup validation failures abort the process with a non-zero exit code;
/// everything after startup degrades per-provider or per-install instead.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct OracleConfig {
    /// Aggregation tick cadence.
    #[serde(default = "default_aggregation_interval_ms")]
    pub aggregation_interval_ms: u64,

    /// Maximum age of an observation eligible to contribute to a tick.
    #[serde(default = "default_observation_staleness_ms")]
    pub observation_staleness_ms: u64,

    /// Maximum age of a published price before the RPC reports `all_stale`.
    #[serde(default = "default_max_price_age_ms")]
    pub max_price_age_ms: u64,

    #[serde(default = "default_rpc_listen_address")]
    pub rpc_listen_address: String,

    /// Reserved for the metrics exporter; recognised and validated so that
    /// documents are portable across deployments that enable it.
    #[serde(default = "default_metrics_listen_address")]
    pub metrics_listen_address: String,

    /// Market-map source selection and cadence.
    pub market_map: MarketMapConfig,

    /// Enabled providers and their runtime options.
    pub providers: Vec<ProviderSpec>,
}

impl OracleConfig {
    pub fn aggregation_interval(&self) -> Duration {
        Duration::from_millis(self.aggregation_interval_ms)
    }

    pub fn observation_staleness(&self) -> Duration {
        Duration::from_millis(self.observation_staleness_ms)
    }

    pub fn max_price_age(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.max_price_age_ms as i64)
    }

    pub fn rpc_listen_address(&self) -> Result<SocketAddr, OracleError> {
        self.rpc_listen_address
            .parse()
            .map_err(|_| {
                OracleError::Config(format!(
                    "invalid rpc_listen_address: {}",
                    self.rpc_listen_address
                ))
            })
    }

    pub fn validate(&self) -> Result<(), OracleError> {
        if self.aggregation_interval_ms == 0
            || self.observation_staleness_ms == 0
            || self.max_price_age_ms == 0
        {
            return Err(OracleError::Config(
                "aggregation cadences must be non-zero".to_string(),
            ));
        }

        self.rpc_listen_address()?;
        self.metrics_listen_address.parse::<SocketAddr>().map_err(|_| {
            OracleError::Config(format!(
                "invalid metrics_listen_address: {}",
                self.metrics_listen_address
            ))
        })?;

        self.market_map.validate()?;

        let mut names = HashSet::with_capacity(self.providers.len());
        for spec in &self.providers {
            spec.validate()?;
            if !names.insert(spec.name.as_str()) {
                return Err(OracleError::Config(format!(
                    "provider {} declared more than once",
                    spec.name
                )));
            }
        }

        Ok(())
    }

    /// Load and validate a configuration document from disk.
    pub fn load(path: &Path) -> Result<Self, OracleError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| OracleError::Config(format!("unreadable config {path:?}: {error}")))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|error| OracleError::Config(format!("undecodable config {path:?}: {error}")))?;
        config.validate()?;
        Ok(config)
    }
}
