use super::{ApiAdapter, ParsedPrices, fill_endpoint_url};
use crate::{
    error::ErrorCode,
    provider::{ApiConfig, Endpoint},
    registry::ProviderAssignment,
};
use lodestone_integration::error::TransportError;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

pub const NAME: &str = "coinmarketcap";

/// CoinMarketCap quotes endpoint. Venue symbols are CMC numeric ids, passed
/// as a comma-separated list; prices are USD quotes.
///
/// See docs: <https://coinmarketcap.com/api/documentation/v2/#operation/getV2CryptocurrencyQuotesLatest>
pub const URL: &str =
    "https://pro-api.coinmarketcap.com/v2/cryptocurrency/quotes/latest?id={ticker}";

pub const MAX_IDS_PER_QUERY: usize = 50;

pub fn default_api_config() -> ApiConfig {
    ApiConfig {
        name: NAME.to_string(),
        enabled: true,
        max_queries: 2,
        interval_ms: 10_000,
        timeout_ms: 5_000,
        endpoints: vec![Endpoint::new(URL)],
    }
}

/// CoinMarketCap quotes REST adapter.
///
/// Used exclusively in CMC-only mode, where every market is quoted by a
/// single CoinMarketCap provider with `min_provider_count = 1`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct CoinMarketCapApi;

/// ### Raw Payload Example
/// ```json
/// {
///   "status": {"error_code": 0, "error_message": null},
///   "data": {
///     "1": {"quote": {"USD": {"price": 60100.25}}}
///   }
/// }
/// ```
#[derive(Debug, Deserialize)]
struct CmcQuoteResponse {
    status: CmcStatus,
    #[serde(default)]
    data: HashMap<String, CmcEntry>,
}

#[derive(Debug, Deserialize)]
struct CmcStatus {
    error_code: i64,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CmcEntry {
    quote: HashMap<String, CmcQuote>,
}

#[derive(Debug, Deserialize)]
struct CmcQuote {
    price: Option<Decimal>,
}

impl ApiAdapter for CoinMarketCapApi {
    fn name(&self) -> &'static str {
        NAME
    }

    fn max_ids_per_query(&self) -> usize {
        MAX_IDS_PER_QUERY
    }

    fn create_url(
        &self,
        endpoint: &Endpoint,
        assignments: &[ProviderAssignment],
    ) -> Result<Url, TransportError> {
        let ids = assignments
            .iter()
            .map(|assignment| assignment.off_chain_ticker.as_str())
            .collect::<Vec<_>>()
            .join(",");
        fill_endpoint_url(&endpoint.url, &ids)
    }

    fn parse(
        &self,
        assignments: &[ProviderAssignment],
        status: reqwest::StatusCode,
        body: &[u8],
    ) -> ParsedPrices {
        let mut parsed = ParsedPrices::default();

        if !status.is_success() {
            for assignment in assignments {
                parsed.unresolved.push((
                    assignment.pair.clone(),
                    ErrorCode::InvalidResponse,
                    format!("venue returned status {status}"),
                ));
            }
            return parsed;
        }

        let response = match serde_json::from_slice::<CmcQuoteResponse>(body) {
            Ok(response) => response,
            Err(error) => {
                for assignment in assignments {
                    parsed.unresolved.push((
                        assignment.pair.clone(),
                        ErrorCode::FailedToDecode,
                        error.to_string(),
                    ));
                }
                return parsed;
            }
        };

        if response.status.error_code != 0 {
            let detail = response
                .status
                .error_message
                .unwrap_or_else(|| format!("error_code {}", response.status.error_code));
            for assignment in assignments {
                parsed.unresolved.push((
                    assignment.pair.clone(),
                    ErrorCode::ApiGeneral,
                    detail.clone(),
                ));
            }
            return parsed;
        }

        for assignment in assignments {
            let price = response
                .data
                .get(&assignment.off_chain_ticker)
                .and_then(|entry| entry.quote.get("USD"))
                .and_then(|quote| quote.price);

            match price {
                Some(price) if price.is_zero() => parsed.unresolved.push((
                    assignment.pair.clone(),
                    ErrorCode::MissingPrice,
                    "venue reported a zero price".to_string(),
                )),
                Some(price) => parsed.resolved.push((assignment.pair.clone(), price)),
                // Left unreported: the poller records MissingPrice.
                None => {}
            }
        }

        parsed
    }
}
