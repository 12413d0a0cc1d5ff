use crate::{
    error::OracleError,
    marketmap::ResolverHealth,
    registry::Registry,
    state::{PriceState, SkipReason},
};
use axum::{Json, Router, extract::State, routing::get};
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::watch;
use tracing::info;

/// Shared context behind the RPC handlers. Every request samples the price
/// snapshot and the installed market map once; no lock is held across
/// request handling.
#[derive(Debug, Clone)]
pub struct RpcContext {
    pub registry: Arc<Registry>,
    pub state: Arc<PriceState>,
    pub health: Arc<ResolverHealth>,
    pub max_price_age: chrono::Duration,
}

/// `Prices` request: an optional filter of canonical pair strings. An empty
/// filter requests every enabled ticker.
#[derive(Debug, Default, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct PricesRequest {
    #[serde(default)]
    pub currency_pairs: Vec<String>,
}

/// `Prices` response: available tickers under `prices`, everything else under
/// `errors` with a reason code instead of a fabricated price.
#[derive(Debug, Default, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct PricesResponse {
    pub prices: IndexMap<String, PriceEntry>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub errors: IndexMap<String, PriceUnavailable>,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct PriceEntry {
    /// Decimal string, exactly as aggregated.
    pub price: String,
    pub decimals: u64,
    /// RFC3339 aggregation timestamp.
    pub timestamp: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct PriceUnavailable {
    pub reason: UnavailableReason,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    InsufficientProviders,
    AllStale,
    UnknownTicker,
    AggregationError,
}

/// Health summary for operators: resolver status plus published price count.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct HealthResponse {
    pub market_map_healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_map_error: Option<String>,
    pub installed_markets: usize,
    pub published_prices: usize,
}

/// Resolve one `Prices` request against the current snapshot.
pub fn resolve_prices(context: &RpcContext, request: &PricesRequest) -> PricesResponse {
    let snapshot = context.state.snapshot();
    let map = context.registry.snapshot();
    let now = Utc::now();

    let requested: Vec<String> = if request.currency_pairs.is_empty() {
        map.markets
            .iter()
            .filter(|(_, market)| market.ticker.enabled)
            .map(|(key, _)| key.clone())
            .collect()
    } else {
        request.currency_pairs.clone()
    };

    let mut response = PricesResponse::default();

    for key in requested {
        if !map.markets.contains_key(&key) {
            response.errors.insert(
                key,
                PriceUnavailable {
                    reason: UnavailableReason::UnknownTicker,
                },
            );
            continue;
        }

        match snapshot.prices.get(&key) {
            Some(aggregated)
                if now.signed_duration_since(aggregated.aggregated_at)
                    > context.max_price_age =>
            {
                response.errors.insert(
                    key,
                    PriceUnavailable {
                        reason: UnavailableReason::AllStale,
                    },
                );
            }
            Some(aggregated) => {
                response.prices.insert(
                    key,
                    PriceEntry {
                        price: aggregated.price.to_string(),
                        decimals: aggregated.decimals,
                        timestamp: aggregated.aggregated_at.to_rfc3339(),
                    },
                );
            }
            None => {
                let reason = match snapshot.skipped.get(&key) {
                    Some(SkipReason::AggregationError) => UnavailableReason::AggregationError,
                    _ => UnavailableReason::InsufficientProviders,
                };
                response
                    .errors
                    .insert(key, PriceUnavailable { reason });
            }
        }
    }

    response
}

async fn prices_all(State(context): State<RpcContext>) -> Json<PricesResponse> {
    Json(resolve_prices(&context, &PricesRequest::default()))
}

async fn prices_filtered(
    State(context): State<RpcContext>,
    Json(request): Json<PricesRequest>,
) -> Json<PricesResponse> {
    Json(resolve_prices(&context, &request))
}

async fn health(State(context): State<RpcContext>) -> Json<HealthResponse> {
    let snapshot = context.state.snapshot();
    Json(HealthResponse {
        market_map_healthy: context.health.is_healthy(),
        market_map_error: context.health.last_error(),
        installed_markets: context.registry.snapshot().markets.len(),
        published_prices: snapshot.prices.len(),
    })
}

pub fn router(context: RpcContext) -> Router {
    Router::new()
        .route("/prices", get(prices_all).post(prices_filtered))
        .route("/health", get(health))
        .with_state(context)
}

/// Serve the local oracle RPC until the shutdown watch flips.
pub async fn serve(
    listen_address: SocketAddr,
    context: RpcContext,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), OracleError> {
    let listener = tokio::net::TcpListener::bind(listen_address)
        .await
        .map_err(OracleError::Rpc)?;
    info!(%listen_address, "oracle RPC listening");

    axum::serve(listener, router(context))
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await
        .map_err(OracleError::Rpc)
}
