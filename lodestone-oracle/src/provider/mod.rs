use crate::{
    buffer::ObservationTx,
    error::OracleError,
    exchange,
    registry::Registry,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};
use tracing::warn;

/// REST polling harness.
pub mod api;

/// WebSocket session harness.
pub mod websocket;

/// One venue URL. The first endpoint of a provider is primary; the rest are
/// failover targets tried in declared order, round-robin on repeated failure.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct Endpoint {
    pub url: String,
}

impl Endpoint {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self { url: url.into() }
    }
}

fn default_max_queries() -> usize {
    4
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// Runtime options for a poll-based provider.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Canonical provider name, matched against market map provider configs.
    pub name: String,

    /// If false, the runtime is not started.
    pub enabled: bool,

    /// Maximum concurrent outbound requests.
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    /// Poll period.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Per-request deadline.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Ordered list of venue URLs; first is primary.
    pub endpoints: Vec<Endpoint>,
}

impl ApiConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), OracleError> {
        if self.name.is_empty() {
            return Err(OracleError::Config("api config missing name".to_string()));
        }
        if self.endpoints.is_empty() {
            return Err(OracleError::Config(format!(
                "api config {} has no endpoints",
                self.name
            )));
        }
        if self.max_queries == 0 {
            return Err(OracleError::Config(format!(
                "api config {} requires max_queries >= 1",
                self.name
            )));
        }
        // Every outbound I/O needs an explicit deadline.
        if self.interval_ms == 0 || self.timeout_ms == 0 {
            return Err(OracleError::Config(format!(
                "api config {} has a zero interval or timeout",
                self.name
            )));
        }
        Ok(())
    }
}

fn default_max_connections() -> usize {
    1
}

fn default_reconnection_timeout_ms() -> u64 {
    10_000
}

fn default_post_connection_timeout_ms() -> u64 {
    1_000
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_read_timeout_ms() -> u64 {
    45_000
}

fn default_write_timeout_ms() -> u64 {
    10_000
}

fn default_write_interval_ms() -> u64 {
    100
}

fn default_ping_interval_ms() -> u64 {
    15_000
}

fn default_max_read_error_count() -> usize {
    5
}

fn default_max_subscriptions_per_connection() -> usize {
    50
}

fn default_max_subscriptions_per_batch() -> usize {
    25
}

fn default_buffer_size() -> usize {
    4096
}

/// Runtime options for a stream-based provider.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct WebSocketConfig {
    /// Canonical provider name, matched against market map provider configs.
    pub name: String,

    /// If false, the runtime is not started.
    pub enabled: bool,

    /// Maximum concurrent open connections.
    #[serde(default = "default_max_connections")]
    pub max_queries: usize,

    /// Initial reconnect back-off; grows exponentially with jitter, capped.
    #[serde(default = "default_reconnection_timeout_ms")]
    pub reconnection_timeout_ms: u64,

    /// Quiet period after a successful connect before the first subscribe.
    #[serde(default = "default_post_connection_timeout_ms")]
    pub post_connection_timeout_ms: u64,

    /// Deadline for the connection upgrade.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Per-read deadline while Live.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Per-write deadline.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Minimum spacing between outbound messages.
    #[serde(default = "default_write_interval_ms")]
    pub write_interval_ms: u64,

    /// Application-level heartbeat cadence.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Consecutive read errors tolerated before the session drains and
    /// redials.
    #[serde(default = "default_max_read_error_count")]
    pub max_read_error_count: usize,

    /// Subscription cap per connection; excess tickers shard onto further
    /// connections up to `max_queries`.
    #[serde(default = "default_max_subscriptions_per_connection")]
    pub max_subscriptions_per_connection: usize,

    /// Subscription cap per outbound frame batch.
    #[serde(default = "default_max_subscriptions_per_batch")]
    pub max_subscriptions_per_batch: usize,

    #[serde(default)]
    pub enable_compression: bool,

    #[serde(default = "default_buffer_size")]
    pub read_buffer_size: usize,

    #[serde(default = "default_buffer_size")]
    pub write_buffer_size: usize,

    /// Ordered list of venue URLs; first is primary.
    pub endpoints: Vec<Endpoint>,
}

impl WebSocketConfig {
    pub fn reconnection_timeout(&self) -> Duration {
        Duration::from_millis(self.reconnection_timeout_ms)
    }

    pub fn post_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.post_connection_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn write_interval(&self) -> Duration {
        Duration::from_millis(self.write_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn validate(&self) -> Result<(), OracleError> {
        if self.name.is_empty() {
            return Err(OracleError::Config(
                "websocket config missing name".to_string(),
            ));
        }
        if self.endpoints.is_empty() {
            return Err(OracleError::Config(format!(
                "websocket config {} has no endpoints",
                self.name
            )));
        }
        if self.max_queries == 0 {
            return Err(OracleError::Config(format!(
                "websocket config {} requires max_queries >= 1",
                self.name
            )));
        }
        if self.max_subscriptions_per_connection == 0 || self.max_subscriptions_per_batch == 0 {
            return Err(OracleError::Config(format!(
                "websocket config {} has a zero subscription cap",
                self.name
            )));
        }
        // Every outbound I/O and read needs an explicit deadline.
        if [
            self.reconnection_timeout_ms,
            self.handshake_timeout_ms,
            self.read_timeout_ms,
            self.write_timeout_ms,
            self.ping_interval_ms,
        ]
        .contains(&0)
        {
            return Err(OracleError::Config(format!(
                "websocket config {} has a zero timeout",
                self.name
            )));
        }
        Ok(())
    }
}

/// A provider runtime declaration: exactly one of the two transports.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct ProviderSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub websocket: Option<WebSocketConfig>,
}

impl ProviderSpec {
    pub fn validate(&self) -> Result<(), OracleError> {
        match (&self.api, &self.websocket) {
            (Some(api), None) => api.validate(),
            (None, Some(websocket)) => websocket.validate(),
            (Some(_), Some(_)) => Err(OracleError::Config(format!(
                "provider {} declares both api and websocket transports",
                self.name
            ))),
            (None, None) => Err(OracleError::Config(format!(
                "provider {} declares no transport",
                self.name
            ))),
        }
    }

    pub fn enabled(&self) -> bool {
        self.api.as_ref().map(|api| api.enabled).unwrap_or(false)
            || self
                .websocket
                .as_ref()
                .map(|websocket| websocket.enabled)
                .unwrap_or(false)
    }
}

/// Handle to one running provider runtime task.
#[derive(Debug)]
pub struct ProviderHandle {
    pub name: String,
    pub join: JoinHandle<()>,
}

impl ProviderHandle {
    pub fn abort(&self) {
        self.join.abort();
    }
}

/// Start the runtime for one provider spec, if enabled and backed by a known
/// adapter. Returns `None` for disabled providers; unknown adapter names are
/// logged and skipped so one bad market map entry never stops its peers.
pub fn spawn_provider(
    spec: &ProviderSpec,
    registry: Arc<Registry>,
    tx: ObservationTx,
    shutdown: watch::Receiver<bool>,
) -> Result<Option<ProviderHandle>, OracleError> {
    spec.validate()?;

    if !spec.enabled() {
        return Ok(None);
    }

    let join = match (&spec.api, &spec.websocket) {
        (Some(api_config), None) => {
            let Some(adapter) = exchange::api_adapter(&api_config.name) else {
                warn!(provider = %api_config.name, "no REST adapter registered, skipping");
                return Ok(None);
            };
            let poller = api::ApiPoller::new(api_config.clone(), adapter, registry, tx)?;
            tokio::spawn(poller.run(shutdown))
        }
        (None, Some(ws_config)) => {
            let Some(adapter) = exchange::ws_adapter(&ws_config.name) else {
                warn!(provider = %ws_config.name, "no WebSocket adapter registered, skipping");
                return Ok(None);
            };
            let provider = websocket::WsProvider::new(ws_config.clone(), adapter, registry, tx);
            tokio::spawn(provider.run(shutdown))
        }
        _ => unreachable!("validated above: exactly one transport"),
    };

    Ok(Some(ProviderHandle {
        name: spec.name.clone(),
        join,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_config() -> ApiConfig {
        ApiConfig {
            name: "kraken_api".to_string(),
            enabled: true,
            max_queries: 2,
            interval_ms: 1_000,
            timeout_ms: 500,
            endpoints: vec![Endpoint::new("https://api.kraken.com/0/public/Ticker")],
        }
    }

    #[test]
    fn test_api_config_requires_deadlines() {
        assert!(api_config().validate().is_ok());

        let mut config = api_config();
        config.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = api_config();
        config.endpoints.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_spec_requires_exactly_one_transport() {
        let spec = ProviderSpec {
            name: "kraken_api".to_string(),
            api: Some(api_config()),
            websocket: None,
        };
        assert!(spec.validate().is_ok());

        let none = ProviderSpec {
            name: "kraken_api".to_string(),
            api: None,
            websocket: None,
        };
        assert!(none.validate().is_err());
    }

    #[test]
    fn test_websocket_config_defaults_deserialise() {
        let input = r#"
        {
            "name": "okx_ws",
            "enabled": true,
            "endpoints": [{"url": "wss://ws.okx.com:8443/ws/v5/public"}]
        }
        "#;
        let config = serde_json::from_str::<WebSocketConfig>(input).unwrap();
        assert_eq!(config.max_queries, 1);
        assert_eq!(config.max_subscriptions_per_connection, 50);
        assert!(config.validate().is_ok());
    }
}
