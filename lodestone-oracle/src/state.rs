use crate::observation::AggregatedPrice;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Why a ticker has no published price for the latest tick.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientProviders,
    AggregationError,
}

/// Immutable result of one aggregation tick.
///
/// `prices` holds the most recent published price per ticker, including
/// values retained from earlier ticks when the current tick could not
/// publish; consumers judge freshness by `aggregated_at`. `skipped` names the
/// tickers the latest tick could not publish and why.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct PriceSnapshot {
    pub prices: IndexMap<String, AggregatedPrice>,
    pub skipped: IndexMap<String, SkipReason>,
}

/// Most-recent aggregated price snapshot shared between the aggregator and
/// the RPC surface.
///
/// The writer (aggregator) replaces the snapshot via atomic `Arc` swap once
/// per tick; readers clone the `Arc` and are never blocked across I/O.
#[derive(Debug, Default)]
pub struct PriceState {
    inner: RwLock<Arc<PriceSnapshot>>,
}

impl PriceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: PriceSnapshot) {
        *self.inner.write() = Arc::new(snapshot);
    }

    pub fn snapshot(&self) -> Arc<PriceSnapshot> {
        Arc::clone(&self.inner.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_publish_replaces_snapshot() {
        let state = PriceState::new();
        assert!(state.snapshot().prices.is_empty());

        let mut snapshot = PriceSnapshot::default();
        snapshot.prices.insert(
            "BTC/USD".to_string(),
            AggregatedPrice {
                pair: "BTC/USD".parse().unwrap(),
                price: dec!(60100),
                decimals: 5,
                aggregated_at: Utc::now(),
                contributing_providers: 3,
            },
        );
        state.publish(snapshot.clone());

        // Readers holding the old snapshot are unaffected by the swap.
        let held = state.snapshot();
        state.publish(PriceSnapshot::default());
        assert_eq!(*held, snapshot);
        assert!(state.snapshot().prices.is_empty());
    }
}
