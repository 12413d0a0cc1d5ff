use crate::{
    error::ErrorCode,
    market::CurrencyPair,
    provider::{ApiConfig, Endpoint, WebSocketConfig},
    registry::ProviderAssignment,
};
use lodestone_integration::{
    error::TransportError,
    protocol::websocket::{FramePayload, WsMessage},
};
use rust_decimal::Decimal;
use std::{fmt::Debug, sync::Arc};
use url::Url;

/// `coinbase_api` REST adapter.
pub mod coinbase;

/// `coinmarketcap_api` REST adapter.
pub mod coinmarketcap;

/// `kraken_api` REST adapter.
pub mod kraken;

/// `mexc_ws` WebSocket adapter.
pub mod mexc;

/// `okx_ws` WebSocket adapter.
pub mod okx;

/// `polymarket_api` REST adapter.
pub mod polymarket;

/// Prices and failures extracted from one REST response.
///
/// Tickers the runtime requested but finds in neither collection are
/// reported as [`ErrorCode::MissingPrice`] by the poller.
#[derive(Debug, Default)]
pub struct ParsedPrices {
    pub resolved: Vec<(CurrencyPair, Decimal)>,
    pub unresolved: Vec<(CurrencyPair, ErrorCode, String)>,
}

/// Capability record for poll-based (REST) venues.
///
/// Adapters are stateless translators between the venue's published wire
/// contract and the engine's observation model; the poller owns scheduling,
/// deadlines and failure isolation.
pub trait ApiAdapter
where
    Self: Debug + Send + Sync,
{
    /// Canonical internal provider name, eg/ `polymarket_api`.
    fn name(&self) -> &'static str;

    /// Maximum number of tickers one request may carry; the poller bins
    /// assignments accordingly.
    fn max_ids_per_query(&self) -> usize;

    /// Build the request [`Url`] for a bin of assigned tickers.
    fn create_url(
        &self,
        endpoint: &Endpoint,
        assignments: &[ProviderAssignment],
    ) -> Result<Url, TransportError>;

    /// Interpret a venue response for the bin of tickers the request carried.
    fn parse(
        &self,
        assignments: &[ProviderAssignment],
        status: reqwest::StatusCode,
        body: &[u8],
    ) -> ParsedPrices;
}

/// Event decoded from one WebSocket frame by a [`WsAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    /// A price update for the venue symbol.
    Price {
        off_chain_ticker: String,
        price: Decimal,
    },
    /// A decode failure scoped to one venue symbol.
    PriceError {
        off_chain_ticker: String,
        code: ErrorCode,
        detail: String,
    },
    /// The venue acknowledged a subscription.
    SubscriptionAck { detail: String },
    /// The venue answered an application-level heartbeat.
    Pong,
}

/// Capability record for stream-based (WebSocket) venues.
pub trait WsAdapter
where
    Self: Debug + Send + Sync,
{
    /// Canonical internal provider name, eg/ `mexc_ws`.
    fn name(&self) -> &'static str;

    /// Subscription frames for one batch of assigned tickers. The session
    /// harness has already capped the batch at
    /// `max_subscriptions_per_batch` and paces sends at `write_interval`.
    fn subscribe_messages(
        &self,
        assignments: &[ProviderAssignment],
    ) -> Result<Vec<WsMessage>, TransportError>;

    /// Decode one data frame into venue events.
    fn handle_frame(&self, payload: FramePayload) -> Result<Vec<WsEvent>, TransportError>;

    /// Application-level heartbeat frame, if the venue requires one beyond
    /// protocol pings.
    fn heartbeat(&self) -> Option<WsMessage>;
}

/// Look up the REST adapter registered under the canonical provider name.
pub fn api_adapter(name: &str) -> Option<Arc<dyn ApiAdapter>> {
    match name {
        coinbase::NAME => Some(Arc::new(coinbase::CoinbaseApi)),
        coinmarketcap::NAME => Some(Arc::new(coinmarketcap::CoinMarketCapApi)),
        kraken::NAME => Some(Arc::new(kraken::KrakenApi)),
        polymarket::NAME => Some(Arc::new(polymarket::PolymarketApi)),
        _ => None,
    }
}

/// Look up the WebSocket adapter registered under the canonical provider name.
pub fn ws_adapter(name: &str) -> Option<Arc<dyn WsAdapter>> {
    match name {
        mexc::NAME => Some(Arc::new(mexc::MexcWs)),
        okx::NAME => Some(Arc::new(okx::OkxWs)),
        _ => None,
    }
}

/// Default runtime configuration shipped with an adapter, keyed by the same
/// canonical name used in market maps.
pub fn default_api_config(name: &str) -> Option<ApiConfig> {
    match name {
        coinbase::NAME => Some(coinbase::default_api_config()),
        coinmarketcap::NAME => Some(coinmarketcap::default_api_config()),
        kraken::NAME => Some(kraken::default_api_config()),
        polymarket::NAME => Some(polymarket::default_api_config()),
        _ => None,
    }
}

/// Default WebSocket configuration shipped with an adapter.
pub fn default_ws_config(name: &str) -> Option<WebSocketConfig> {
    match name {
        mexc::NAME => Some(mexc::default_ws_config()),
        okx::NAME => Some(okx::default_ws_config()),
        _ => None,
    }
}

/// Substitute a venue symbol into an endpoint URL template.
///
/// Endpoint URLs for single-ticker venues carry a `{ticker}` placeholder,
/// eg/ `https://clob.polymarket.com/midpoint?token_id={ticker}`.
pub(crate) fn fill_endpoint_url(template: &str, value: &str) -> Result<Url, TransportError> {
    Url::parse(&template.replace("{ticker}", value)).map_err(TransportError::UrlParse)
}
