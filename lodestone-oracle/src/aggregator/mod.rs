use crate::{
    buffer::ObservationRx,
    market::CurrencyPair,
    observation::{AggregatedPrice, PriceObservation, ProviderEvent},
    registry::Registry,
    state::{PriceSnapshot, PriceState, SkipReason},
};
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Deterministic median over provider contributions.
pub mod median;

/// Per-tick reducer turning the latest observation per `(provider, ticker)`
/// into one canonical price per ticker.
///
/// Each tick: drain the provider ring buffers, snapshot the enabled markets,
/// drop observations outside the staleness window, apply provider transforms
/// (invert, then normalize-by-pair using this tick's aggregated prices, in
/// topological order), gate on `min_provider_count`, and publish the median.
/// The transform/median path is `Decimal` end to end, so identical inputs
/// produce bit-identical outputs across runs and validators.
#[derive(Debug)]
pub struct Aggregator {
    registry: Arc<Registry>,
    state: Arc<PriceState>,
    buffers: Vec<ObservationRx>,
    interval: Duration,
    staleness: chrono::Duration,
    // Latest observation per pair per provider, refreshed from the buffers.
    latest: FnvHashMap<CurrencyPair, FnvHashMap<String, PriceObservation>>,
}

impl Aggregator {
    pub fn new(
        registry: Arc<Registry>,
        state: Arc<PriceState>,
        buffers: Vec<ObservationRx>,
        interval: Duration,
        staleness: Duration,
    ) -> Self {
        Self {
            registry,
            state,
            buffers,
            interval,
            staleness: chrono::Duration::from_std(staleness)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
            latest: FnvHashMap::default(),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("aggregator shutting down");
                        break;
                    }
                }
                _ = interval.tick() => self.tick(Utc::now()),
            }
        }
    }

    /// One aggregation pass at the given instant.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.drain_buffers();

        let map = self.registry.snapshot();
        let order = match map.normalization_order() {
            Ok(order) => order,
            // Unreachable for installed maps; guard against a torn registry.
            Err(error) => {
                error!(%error, "installed market map lost normalization order");
                return;
            }
        };

        let previous = self.state.snapshot();
        let mut prices: IndexMap<String, AggregatedPrice> = IndexMap::new();
        let mut skipped: IndexMap<String, SkipReason> = IndexMap::new();

        for key in order {
            let market = &map.markets[&key];
            if !market.ticker.enabled {
                continue;
            }

            let mut contributions: Vec<(String, Decimal)> = Vec::new();

            for config in &market.provider_configs {
                let Some(observation) = self
                    .latest
                    .get(&market.ticker.currency_pair)
                    .and_then(|by_provider| by_provider.get(&config.name))
                else {
                    continue;
                };

                // Boundary inclusive: an observation exactly at the window
                // edge still contributes.
                if now.signed_duration_since(observation.observed_at) > self.staleness {
                    debug!(
                        provider = %config.name,
                        pair = %market.ticker.currency_pair,
                        observed_at = %observation.observed_at,
                        code = %crate::error::ErrorCode::StaleObservation,
                        "dropping stale observation"
                    );
                    continue;
                }

                let mut price = observation.price;

                if config.invert {
                    if price.is_zero() {
                        warn!(
                            provider = %config.name,
                            pair = %market.ticker.currency_pair,
                            code = %crate::error::ErrorCode::InvertByZero,
                            "cannot invert zero price"
                        );
                        continue;
                    }
                    let Some(inverted) = Decimal::ONE.checked_div(price) else {
                        continue;
                    };
                    price = inverted;
                }

                if let Some(normalize_by) = &config.normalize_by_pair {
                    // Two-pass schedule: the normalization pair was already
                    // aggregated this tick (topological order), possibly as a
                    // retained value from an earlier tick.
                    let Some(normalizer) = prices.get(&normalize_by.to_string()) else {
                        debug!(
                            provider = %config.name,
                            pair = %market.ticker.currency_pair,
                            normalize_by = %normalize_by,
                            "normalization pair has no aggregated price"
                        );
                        continue;
                    };
                    let Some(normalized) = price.checked_mul(normalizer.price) else {
                        continue;
                    };
                    price = normalized;
                }

                contributions.push((config.name.clone(), price));
            }

            if (contributions.len() as u64) < market.ticker.min_provider_count {
                // Retain the previous value if any; consumers see its age.
                if let Some(previous_price) = previous.prices.get(&key) {
                    prices.insert(key.clone(), previous_price.clone());
                }
                skipped.insert(key, SkipReason::InsufficientProviders);
                continue;
            }

            match median::median(&mut contributions) {
                Some(price) => {
                    prices.insert(
                        key,
                        AggregatedPrice {
                            pair: market.ticker.currency_pair.clone(),
                            price,
                            decimals: market.ticker.decimals,
                            aggregated_at: now,
                            contributing_providers: contributions.len(),
                        },
                    );
                }
                None => {
                    skipped.insert(key, SkipReason::AggregationError);
                }
            }
        }

        self.state.publish(PriceSnapshot { prices, skipped });
    }

    fn drain_buffers(&mut self) {
        for buffer in &self.buffers {
            for event in buffer.drain() {
                match event {
                    ProviderEvent::Price(observation) => {
                        self.latest
                            .entry(observation.pair.clone())
                            .or_default()
                            .insert(observation.provider.clone(), observation);
                    }
                    ProviderEvent::Error(observation_error) => {
                        // Recorded against the (provider, pair) slot: no new
                        // price arrives, so the slot ages out of the window.
                        debug!(
                            provider = %observation_error.provider,
                            pair = %observation_error.pair,
                            code = %observation_error.code,
                            detail = %observation_error.detail,
                            "provider reported observation error"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffer::{ObservationTx, observation_channel},
        market::{Market, MarketMap, ProviderConfig, Ticker},
        observation::PriceObservation,
    };
    use indexmap::IndexMap as StdIndexMap;
    use rust_decimal_macros::dec;

    struct Fixture {
        aggregator: Aggregator,
        tx: ObservationTx,
        state: Arc<PriceState>,
    }

    fn fixture(markets: Vec<(&str, u64, Vec<ProviderConfig>)>) -> Fixture {
        let mut map = StdIndexMap::new();
        for (pair, min_provider_count, provider_configs) in markets {
            map.insert(
                pair.to_string(),
                Market {
                    ticker: Ticker {
                        currency_pair: pair.parse().unwrap(),
                        decimals: 8,
                        min_provider_count,
                        enabled: true,
                        metadata_json: String::new(),
                    },
                    provider_configs,
                },
            );
        }

        let registry = Arc::new(Registry::new());
        registry.install(MarketMap { markets: map }).unwrap();

        let state = Arc::new(PriceState::new());
        let (tx, rx) = observation_channel(256);

        Fixture {
            aggregator: Aggregator::new(
                Arc::clone(&registry),
                Arc::clone(&state),
                vec![rx],
                Duration::from_secs(1),
                Duration::from_secs(30),
            ),
            tx,
            state,
        }
    }

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            off_chain_ticker: "any".to_string(),
            invert: false,
            normalize_by_pair: None,
            metadata_json: String::new(),
        }
    }

    fn observe(
        tx: &ObservationTx,
        provider: &str,
        pair: &str,
        price: Decimal,
        observed_at: DateTime<Utc>,
    ) {
        tx.push(ProviderEvent::Price(PriceObservation {
            provider: provider.to_string(),
            pair: pair.parse().unwrap(),
            price,
            observed_at,
        }));
    }

    #[test]
    fn test_happy_median() {
        let mut f = fixture(vec![(
            "BTC/USD",
            2,
            vec![provider("a"), provider("b"), provider("c")],
        )]);
        let now = Utc::now();

        observe(&f.tx, "a", "BTC/USD", dec!(60000), now);
        observe(&f.tx, "b", "BTC/USD", dec!(60100), now);
        observe(&f.tx, "c", "BTC/USD", dec!(60200), now);
        f.aggregator.tick(now);

        let snapshot = f.state.snapshot();
        let btc = &snapshot.prices["BTC/USD"];
        assert_eq!(btc.price, dec!(60100));
        assert_eq!(btc.contributing_providers, 3);
        assert_eq!(btc.aggregated_at, now);
    }

    #[test]
    fn test_even_count_median() {
        let mut f = fixture(vec![(
            "BTC/USD",
            2,
            vec![provider("a"), provider("b"), provider("c"), provider("d")],
        )]);
        let now = Utc::now();

        observe(&f.tx, "a", "BTC/USD", dec!(100), now);
        observe(&f.tx, "b", "BTC/USD", dec!(102), now);
        observe(&f.tx, "c", "BTC/USD", dec!(104), now);
        observe(&f.tx, "d", "BTC/USD", dec!(110), now);
        f.aggregator.tick(now);

        assert_eq!(f.state.snapshot().prices["BTC/USD"].price, dec!(103));
    }

    #[test]
    fn test_insufficient_providers_skips_publish() {
        let mut f = fixture(vec![(
            "ETH/USD",
            3,
            vec![provider("a"), provider("b"), provider("c")],
        )]);
        let now = Utc::now();

        observe(&f.tx, "a", "ETH/USD", dec!(3000), now);
        observe(&f.tx, "b", "ETH/USD", dec!(3010), now);
        f.aggregator.tick(now);

        let snapshot = f.state.snapshot();
        assert!(snapshot.prices.get("ETH/USD").is_none());
        assert_eq!(
            snapshot.skipped["ETH/USD"],
            SkipReason::InsufficientProviders
        );
    }

    #[test]
    fn test_insufficient_providers_retains_previous_value() {
        let mut f = fixture(vec![("ETH/USD", 2, vec![provider("a"), provider("b")])]);
        let t0 = Utc::now();

        observe(&f.tx, "a", "ETH/USD", dec!(3000), t0);
        observe(&f.tx, "b", "ETH/USD", dec!(3010), t0);
        f.aggregator.tick(t0);
        assert_eq!(f.state.snapshot().prices["ETH/USD"].aggregated_at, t0);

        // One provider ages out; the tick cannot publish but the previous
        // value is retained with its original timestamp.
        let t1 = t0 + chrono::Duration::seconds(60);
        observe(&f.tx, "a", "ETH/USD", dec!(3020), t1);
        f.aggregator.tick(t1);

        let snapshot = f.state.snapshot();
        assert_eq!(snapshot.prices["ETH/USD"].aggregated_at, t0);
        assert_eq!(snapshot.prices["ETH/USD"].price, dec!(3005));
        assert_eq!(
            snapshot.skipped["ETH/USD"],
            SkipReason::InsufficientProviders
        );
    }

    #[test]
    fn test_normalization_path() {
        let mut atom_provider_a = provider("a");
        atom_provider_a.normalize_by_pair = Some("USDT/USD".parse().unwrap());
        let mut atom_provider_b = provider("b");
        atom_provider_b.normalize_by_pair = Some("USDT/USD".parse().unwrap());

        let mut f = fixture(vec![
            ("ATOM/USD", 1, vec![atom_provider_a, atom_provider_b]),
            ("USDT/USD", 1, vec![provider("k")]),
        ]);
        let now = Utc::now();

        observe(&f.tx, "a", "ATOM/USD", dec!(10), now);
        observe(&f.tx, "b", "ATOM/USD", dec!(10.1), now);
        observe(&f.tx, "k", "USDT/USD", dec!(0.999), now);
        f.aggregator.tick(now);

        let snapshot = f.state.snapshot();
        assert_eq!(snapshot.prices["USDT/USD"].price, dec!(0.999));
        // median of {10 * 0.999, 10.1 * 0.999} = (9.990 + 10.0899) / 2
        assert_eq!(snapshot.prices["ATOM/USD"].price, dec!(10.03995));
    }

    #[test]
    fn test_invert_transform() {
        let mut inverted = provider("a");
        inverted.invert = true;

        let mut f = fixture(vec![("USD/BTC", 1, vec![inverted])]);
        let now = Utc::now();

        observe(&f.tx, "a", "USD/BTC", dec!(0.000025), now);
        f.aggregator.tick(now);

        assert_eq!(f.state.snapshot().prices["USD/BTC"].price, dec!(40000));
    }

    #[test]
    fn test_invert_by_zero_drops_contribution() {
        let mut inverted = provider("a");
        inverted.invert = true;

        let mut f = fixture(vec![("USD/BTC", 1, vec![inverted])]);
        let now = Utc::now();

        observe(&f.tx, "a", "USD/BTC", dec!(0), now);
        f.aggregator.tick(now);

        let snapshot = f.state.snapshot();
        assert!(snapshot.prices.get("USD/BTC").is_none());
        assert_eq!(
            snapshot.skipped["USD/BTC"],
            SkipReason::InsufficientProviders
        );
    }

    #[test]
    fn test_staleness_boundary_is_inclusive() {
        let mut f = fixture(vec![("BTC/USD", 1, vec![provider("a"), provider("b")])]);
        let now = Utc::now();

        // Exactly at the window edge: accepted.
        observe(
            &f.tx,
            "a",
            "BTC/USD",
            dec!(60000),
            now - chrono::Duration::seconds(30),
        );
        // One millisecond older: rejected.
        observe(
            &f.tx,
            "b",
            "BTC/USD",
            dec!(70000),
            now - chrono::Duration::seconds(30) - chrono::Duration::milliseconds(1),
        );
        f.aggregator.tick(now);

        let btc = &f.state.snapshot().prices["BTC/USD"];
        assert_eq!(btc.price, dec!(60000));
        assert_eq!(btc.contributing_providers, 1);
    }

    #[test]
    fn test_determinism_across_runs() {
        let now = Utc::now();
        let run = || {
            let mut f = fixture(vec![(
                "BTC/USD",
                2,
                vec![provider("a"), provider("b"), provider("c")],
            )]);
            observe(&f.tx, "c", "BTC/USD", dec!(60200.000001), now);
            observe(&f.tx, "a", "BTC/USD", dec!(59999.999999), now);
            observe(&f.tx, "b", "BTC/USD", dec!(60100.5), now);
            f.aggregator.tick(now);
            f.state.snapshot().prices["BTC/USD"].clone()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_latest_observation_per_provider_wins() {
        let mut f = fixture(vec![("BTC/USD", 1, vec![provider("a")])]);
        let now = Utc::now();

        observe(&f.tx, "a", "BTC/USD", dec!(60000), now - chrono::Duration::seconds(2));
        observe(&f.tx, "a", "BTC/USD", dec!(60500), now);
        f.aggregator.tick(now);

        assert_eq!(f.state.snapshot().prices["BTC/USD"].price, dec!(60500));
    }
}
