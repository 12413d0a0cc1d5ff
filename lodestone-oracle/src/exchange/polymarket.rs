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

pub const NAME: &str = "polymarket_api";

/// Polymarket CLOB midpoint endpoint. One token id per request; prices are
/// USD-denominated outcome probabilities in `[0, 1]`.
///
/// See docs: <https://docs.polymarket.com/#get-midpoint-price>
pub const URL: &str = "https://clob.polymarket.com/midpoint?token_id={ticker}";

/// Midpoints of exactly `0` are floored to this value. Prediction market
/// prices at zero would otherwise break inversion paths downstream, and a
/// resolved-to-zero outcome still trades at a dust price.
pub const PRICE_FLOOR: Decimal = Decimal::from_parts(1, 0, 0, false, 4);

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

/// Polymarket CLOB midpoint REST adapter.
///
/// This adapter is floor-permitted: an exact zero midpoint is substituted
/// with [`PRICE_FLOOR`] instead of being reported missing.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct PolymarketApi;

/// ### Raw Payload Example
/// ```json
/// {"mid": "0.45"}
/// ```
#[derive(Debug, Deserialize)]
struct MidpointResponse {
    #[serde(default, with = "rust_decimal::serde::str_option")]
    mid: Option<Decimal>,
}

impl ApiAdapter for PolymarketApi {
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

        match serde_json::from_slice::<MidpointResponse>(body) {
            Ok(MidpointResponse { mid: Some(mid) }) => {
                let price = if mid.is_zero() { PRICE_FLOOR } else { mid };
                parsed.resolved.push((assignment.pair.clone(), price));
            }
            Ok(MidpointResponse { mid: None }) => parsed.unresolved.push((
                assignment.pair.clone(),
                ErrorCode::FailedToDecode,
                "unable to get price from response".to_string(),
            )),
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

    fn assignment(token_id: &str) -> ProviderAssignment {
        ProviderAssignment {
            pair: "TRUMP-WIN/USD".parse().unwrap(),
            off_chain_ticker: token_id.to_string(),
            config: ProviderConfig {
                name: NAME.to_string(),
                off_chain_ticker: token_id.to_string(),
                invert: false,
                normalize_by_pair: None,
                metadata_json: String::new(),
            },
        }
    }

    #[test]
    fn test_parse_midpoint() {
        let parsed = PolymarketApi.parse(
            &[assignment("1234")],
            reqwest::StatusCode::OK,
            br#"{"mid": "0.45"}"#,
        );
        assert_eq!(parsed.resolved[0].1, dec!(0.45));
    }

    #[test]
    fn test_parse_zero_midpoint_is_floored() {
        let parsed = PolymarketApi.parse(
            &[assignment("1234")],
            reqwest::StatusCode::OK,
            br#"{"mid": "0.00"}"#,
        );
        assert_eq!(parsed.resolved[0].1, dec!(0.0001));
    }

    #[test]
    fn test_parse_missing_mid_fails_to_decode() {
        let parsed = PolymarketApi.parse(
            &[assignment("1234")],
            reqwest::StatusCode::OK,
            br#"{}"#,
        );
        assert_eq!(parsed.unresolved[0].1, ErrorCode::FailedToDecode);
    }
}
