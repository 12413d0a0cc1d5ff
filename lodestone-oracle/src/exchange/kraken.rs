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

pub const NAME: &str = "kraken_api";

/// Kraken public Ticker endpoint. Accepts a comma-separated list of venue
/// symbols, eg/ `XXBTZUSD,XETHZUSD`.
///
/// See docs: <https://docs.kraken.com/api/docs/rest-api/get-ticker-information>
pub const URL: &str = "https://api.kraken.com/0/public/Ticker?pair={ticker}";

/// Kraken accepts many pairs per request; stay well under URL length limits.
pub const MAX_IDS_PER_QUERY: usize = 20;

pub fn default_api_config() -> ApiConfig {
    ApiConfig {
        name: NAME.to_string(),
        enabled: true,
        max_queries: 2,
        interval_ms: 2_000,
        timeout_ms: 3_000,
        endpoints: vec![Endpoint::new(URL)],
    }
}

/// Kraken public Ticker REST adapter.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct KrakenApi;

/// ### Raw Payload Example
/// ```json
/// {
///   "error": [],
///   "result": {
///     "XXBTZUSD": {"c": ["60100.10000", "0.01000000"]}
///   }
/// }
/// ```
/// `c[0]` is the last trade close price.
#[derive(Debug, Deserialize)]
struct KrakenTickerResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, KrakenTicker>,
}

#[derive(Debug, Deserialize)]
struct KrakenTicker {
    c: Vec<String>,
}

impl ApiAdapter for KrakenApi {
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
        let pairs = assignments
            .iter()
            .map(|assignment| assignment.off_chain_ticker.as_str())
            .collect::<Vec<_>>()
            .join(",");
        fill_endpoint_url(&endpoint.url, &pairs)
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

        let response = match serde_json::from_slice::<KrakenTickerResponse>(body) {
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

        if !response.error.is_empty() {
            for assignment in assignments {
                parsed.unresolved.push((
                    assignment.pair.clone(),
                    ErrorCode::ApiGeneral,
                    response.error.join("; "),
                ));
            }
            return parsed;
        }

        for assignment in assignments {
            let Some(ticker) = response.result.get(&assignment.off_chain_ticker) else {
                // Left unreported: the poller records MissingPrice.
                continue;
            };

            match ticker.c.first().map(|close| close.parse::<Decimal>()) {
                Some(Ok(price)) if price.is_zero() => parsed.unresolved.push((
                    assignment.pair.clone(),
                    ErrorCode::MissingPrice,
                    "venue reported a zero price".to_string(),
                )),
                Some(Ok(price)) => parsed.resolved.push((assignment.pair.clone(), price)),
                Some(Err(error)) => parsed.unresolved.push((
                    assignment.pair.clone(),
                    ErrorCode::FailedToParsePrice,
                    error.to_string(),
                )),
                None => parsed.unresolved.push((
                    assignment.pair.clone(),
                    ErrorCode::InvalidResponse,
                    "ticker entry carried no close price".to_string(),
                )),
            }
        }

        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::ProviderConfig;
    use rust_decimal_macros::dec;

    fn assignment(pair: &str, off_chain: &str) -> ProviderAssignment {
        ProviderAssignment {
            pair: pair.parse().unwrap(),
            off_chain_ticker: off_chain.to_string(),
            config: ProviderConfig {
                name: NAME.to_string(),
                off_chain_ticker: off_chain.to_string(),
                invert: false,
                normalize_by_pair: None,
                metadata_json: String::new(),
            },
        }
    }

    #[test]
    fn test_create_url_joins_pairs() {
        let url = KrakenApi
            .create_url(
                &Endpoint::new(URL),
                &[
                    assignment("BTC/USD", "XXBTZUSD"),
                    assignment("ETH/USD", "XETHZUSD"),
                ],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.kraken.com/0/public/Ticker?pair=XXBTZUSD,XETHZUSD"
        );
    }

    #[test]
    fn test_parse_multi_ticker_response() {
        let body = br#"
        {
            "error": [],
            "result": {
                "XXBTZUSD": {"c": ["60100.10000", "0.01000000"]},
                "XETHZUSD": {"c": ["3000.05000", "1.00000000"]}
            }
        }
        "#;
        let parsed = KrakenApi.parse(
            &[
                assignment("BTC/USD", "XXBTZUSD"),
                assignment("ETH/USD", "XETHZUSD"),
                assignment("SOL/USD", "SOLUSD"),
            ],
            reqwest::StatusCode::OK,
            body,
        );

        assert_eq!(
            parsed.resolved,
            vec![
                ("BTC/USD".parse().unwrap(), dec!(60100.10000)),
                ("ETH/USD".parse().unwrap(), dec!(3000.05000)),
            ]
        );
        // SOL/USD is simply absent; the poller reports MissingPrice.
        assert!(parsed.unresolved.is_empty());
    }

    #[test]
    fn test_parse_venue_error_fails_whole_bin() {
        let body = br#"{"error": ["EQuery:Unknown asset pair"], "result": {}}"#;
        let parsed = KrakenApi.parse(
            &[assignment("BTC/USD", "NOPE")],
            reqwest::StatusCode::OK,
            body,
        );
        assert_eq!(parsed.unresolved[0].1, ErrorCode::ApiGeneral);
    }
}
