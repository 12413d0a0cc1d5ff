use crate::{error::ErrorCode, market::CurrencyPair};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

/// A single price reported by one provider for one currency pair.
///
/// `observed_at` is stamped where the payload is decoded (REST response parse
/// or WebSocket frame decode), not at message origin.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct PriceObservation {
    pub provider: String,
    pub pair: CurrencyPair,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// A structured failure recorded against a `(provider, pair)` slot.
///
/// Failures reduce the contributing set for the pair on the next tick; they
/// never cancel the provider or its peers.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct ObservationError {
    pub provider: String,
    pub pair: CurrencyPair,
    pub code: ErrorCode,
    pub detail: String,
}

/// Event pushed from a provider runtime into its observation ring buffer.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub enum ProviderEvent {
    Price(PriceObservation),
    Error(ObservationError),
}

/// The canonical price for one ticker produced by an aggregation tick.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct AggregatedPrice {
    pub pair: CurrencyPair,
    pub price: Decimal,
    pub decimals: u64,
    pub aggregated_at: DateTime<Utc>,
    pub contributing_providers: usize,
}

impl AggregatedPrice {
    /// Scaled integer representation used at the publish boundary:
    /// `price * 10^decimals`, truncated.
    ///
    /// Returns `None` when the scaled value does not fit the decimal
    /// representation (decimals near the upper bound with large prices).
    pub fn scaled_price(&self) -> Option<i128> {
        let mut scaled = self.price;
        for _ in 0..self.decimals {
            scaled = scaled.checked_mul(Decimal::TEN)?;
        }
        scaled.trunc().to_i128()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn aggregated(price: Decimal, decimals: u64) -> AggregatedPrice {
        AggregatedPrice {
            pair: "BTC/USD".parse().unwrap(),
            price,
            decimals,
            aggregated_at: Utc::now(),
            contributing_providers: 3,
        }
    }

    #[test]
    fn test_scaled_price_truncates() {
        assert_eq!(
            aggregated(dec!(60100.5), 5).scaled_price(),
            Some(6_010_050_000)
        );
        assert_eq!(aggregated(dec!(0.999), 8).scaled_price(), Some(99_900_000));
        assert_eq!(aggregated(dec!(1.23456789), 2).scaled_price(), Some(123));
    }

    #[test]
    fn test_scaled_price_overflow_is_none() {
        assert_eq!(aggregated(dec!(60100), 36).scaled_price(), None);
    }
}
