use super::{ApiAdapter, ParsedPrices, fill_endpoint_url};
use crate::{
    error::ErrorCode,
    provider::{ApiConfig, Endpoint},
    registry::ProviderAssignment,
};
use lodestone_integration::error::TransportError;
use rust_decimal::Decimal;
use serde::Deserialize;
use url::Url;

pub const NAME: &str = "coinbase_api";

/// Coinbase spot price endpoint. One ticker per request, quote currency baked
/// into the venue symbol, eg/ `BTC-USD`.
///
/// See docs: <https://docs.cdp.coinbase.com/coinbase-app/docs/api-prices>
pub const URL: &str = "https://api.coinbase.com/v2/prices/{ticker}/spot";

pub fn default_api_config() -> ApiConfig {
    ApiConfig {
        name: NAME.to_string(),
        enabled: true,
        max_queries: 4,
        interval_ms: 2_000,
        timeout_ms: 3_000,
        endpoints: vec![Endpoint::new(URL)],
    }
}

/// Coinbase spot price REST adapter.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct CoinbaseApi;

/// ### Raw Payload Example
/// ```json
/// {"data":{"amount":"60100.25","base":"BTC","currency":"USD"}}
/// ```
#[derive(Debug, Deserialize)]
struct CoinbaseSpotResponse {
    data: CoinbaseSpotData,
}

#[derive(Debug, Deserialize)]
struct CoinbaseSpotData {
    #[serde(with = "rust_decimal::serde::str")]
    amount: Decimal,
}

impl ApiAdapter for CoinbaseApi {
    fn name(&self) -> &'static str {
        NAME
    }

    fn max_ids_per_query(&self) -> usize {
        1
    }

    fn create_url(
        &self,
        endpoint: &Endpoint,
        assignments: &[ProviderAssignment],
    ) -> Result<Url, TransportError> {
        let [assignment] = assignments else {
            return Err(TransportError::Unsupported {
                entity: NAME,
                item: format!("expected 1 ticker per request, got {}", assignments.len()),
            });
        };
        fill_endpoint_url(&endpoint.url, &assignment.off_chain_ticker)
    }

    fn parse(
        &self,
        assignments: &[ProviderAssignment],
        status: reqwest::StatusCode,
        body: &[u8],
    ) -> ParsedPrices {
        let mut parsed = ParsedPrices::default();
        let Some(assignment) = assignments.first() else {
            return parsed;
        };

        if !status.is_success() {
            parsed.unresolved.push((
                assignment.pair.clone(),
                ErrorCode::InvalidResponse,
                format!("venue returned status {status}"),
            ));
            return parsed;
        }

        match serde_json::from_slice::<CoinbaseSpotResponse>(body) {
            Ok(response) if response.data.amount.is_zero() => parsed.unresolved.push((
                assignment.pair.clone(),
                ErrorCode::MissingPrice,
                "venue reported a zero price".to_string(),
            )),
            Ok(response) => parsed
                .resolved
                .push((assignment.pair.clone(), response.data.amount)),
            Err(error) => parsed.unresolved.push((
                assignment.pair.clone(),
                ErrorCode::FailedToDecode,
                error.to_string(),
            )),
        }

        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::ProviderConfig;
    use rust_decimal_macros::dec;

    fn assignment(off_chain: &str) -> ProviderAssignment {
        ProviderAssignment {
            pair: "BTC/USD".parse().unwrap(),
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
    fn test_create_url_substitutes_ticker() {
        let url = CoinbaseApi
            .create_url(&Endpoint::new(URL), &[assignment("BTC-USD")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.coinbase.com/v2/prices/BTC-USD/spot"
        );
    }

    #[test]
    fn test_parse_spot_price() {
        let body = br#"{"data":{"amount":"60100.25","base":"BTC","currency":"USD"}}"#;
        let parsed = CoinbaseApi.parse(
            &[assignment("BTC-USD")],
            reqwest::StatusCode::OK,
            body,
        );
        assert_eq!(
            parsed.resolved,
            vec![("BTC/USD".parse().unwrap(), dec!(60100.25))]
        );
        assert!(parsed.unresolved.is_empty());
    }

    #[test]
    fn test_parse_zero_price_is_missing() {
        let body = br#"{"data":{"amount":"0","base":"BTC","currency":"USD"}}"#;
        let parsed = CoinbaseApi.parse(
            &[assignment("BTC-USD")],
            reqwest::StatusCode::OK,
            body,
        );
        assert!(parsed.resolved.is_empty());
        assert_eq!(parsed.unresolved[0].1, ErrorCode::MissingPrice);
    }

    #[test]
    fn test_parse_error_status() {
        let parsed = CoinbaseApi.parse(
            &[assignment("BTC-USD")],
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            b"rate limited",
        );
        assert_eq!(parsed.unresolved[0].1, ErrorCode::InvalidResponse);
    }
}
