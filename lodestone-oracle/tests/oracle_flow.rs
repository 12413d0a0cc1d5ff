//! End-to-end flows through the public engine surface: market-map
//! resolution installs into the registry, observations flow through the
//! ring buffers into the aggregator, and the RPC view reports prices or
//! reason codes.

use chrono::Utc;
use indexmap::IndexMap;
use lodestone_oracle::{
    aggregator::Aggregator,
    buffer::observation_channel,
    error::OracleError,
    market::{Market, MarketMap, ProviderConfig, Ticker},
    marketmap::{MarketMapSource, ResolverHealth, multi::ResearchMarketMapFetcher, research},
    observation::{PriceObservation, ProviderEvent},
    registry::Registry,
    rpc::{PricesRequest, RpcContext, UnavailableReason, resolve_prices},
    state::PriceState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::{sync::Arc, time::Duration};

fn market(
    pair: &str,
    min_provider_count: u64,
    providers: &[(&str, &str)],
    normalize_by: Option<&str>,
) -> (String, Market) {
    (
        pair.to_string(),
        Market {
            ticker: Ticker {
                currency_pair: pair.parse().unwrap(),
                decimals: 5,
                min_provider_count,
                enabled: true,
                metadata_json: String::new(),
            },
            provider_configs: providers
                .iter()
                .map(|(name, off_chain)| ProviderConfig {
                    name: name.to_string(),
                    off_chain_ticker: off_chain.to_string(),
                    invert: false,
                    normalize_by_pair: normalize_by.map(|pair| pair.parse().unwrap()),
                    metadata_json: String::new(),
                })
                .collect(),
        },
    )
}

fn observe(provider: &str, pair: &str, price: Decimal) -> ProviderEvent {
    ProviderEvent::Price(PriceObservation {
        provider: provider.to_string(),
        pair: pair.parse().unwrap(),
        price,
        observed_at: Utc::now(),
    })
}

#[test]
fn pipeline_publishes_median_to_rpc() {
    let registry = Arc::new(Registry::new());
    registry
        .install(MarketMap {
            markets: IndexMap::from([
                market(
                    "BTC/USD",
                    2,
                    &[("a", "BTC-USD"), ("b", "BTCUSD"), ("c", "XXBTZUSD")],
                    None,
                ),
                market("ETH/USD", 3, &[("a", "ETH-USD"), ("b", "ETHUSD")], None),
            ]),
        })
        .unwrap();

    let state = Arc::new(PriceState::new());
    let (tx, rx) = observation_channel(64);
    let mut aggregator = Aggregator::new(
        Arc::clone(&registry),
        Arc::clone(&state),
        vec![rx],
        Duration::from_secs(1),
        Duration::from_secs(30),
    );

    tx.push(observe("a", "BTC/USD", dec!(60000)));
    tx.push(observe("b", "BTC/USD", dec!(60100)));
    tx.push(observe("c", "BTC/USD", dec!(60200)));
    tx.push(observe("a", "ETH/USD", dec!(3000)));
    tx.push(observe("b", "ETH/USD", dec!(3010)));
    aggregator.tick(Utc::now());

    let context = RpcContext {
        registry,
        state,
        health: Arc::new(ResolverHealth::default()),
        max_price_age: chrono::Duration::seconds(120),
    };
    let response = resolve_prices(&context, &PricesRequest::default());

    assert_eq!(response.prices["BTC/USD"].price, "60100");
    assert_eq!(response.prices["BTC/USD"].decimals, 5);

    // ETH/USD had two fresh observations against min_provider_count 3.
    assert_eq!(
        response.errors["ETH/USD"].reason,
        UnavailableReason::InsufficientProviders
    );

    let filtered = resolve_prices(
        &context,
        &PricesRequest {
            currency_pairs: vec!["BTC/USD".to_string(), "XRP/USD".to_string()],
        },
    );
    assert_eq!(filtered.prices.len(), 1);
    assert_eq!(
        filtered.errors["XRP/USD"].reason,
        UnavailableReason::UnknownTicker
    );
}

#[test]
fn normalization_flows_through_index_pair() {
    let registry = Arc::new(Registry::new());
    registry
        .install(MarketMap {
            markets: IndexMap::from([
                market(
                    "ATOM/USD",
                    1,
                    &[("a", "ATOM-USDT"), ("b", "ATOMUSDT")],
                    Some("USDT/USD"),
                ),
                market("USDT/USD", 1, &[("k", "USDTZUSD")], None),
            ]),
        })
        .unwrap();

    let state = Arc::new(PriceState::new());
    let (tx, rx) = observation_channel(64);
    let mut aggregator = Aggregator::new(
        Arc::clone(&registry),
        Arc::clone(&state),
        vec![rx],
        Duration::from_secs(1),
        Duration::from_secs(30),
    );

    tx.push(observe("a", "ATOM/USD", dec!(10)));
    tx.push(observe("b", "ATOM/USD", dec!(10.1)));
    tx.push(observe("k", "USDT/USD", dec!(0.999)));
    aggregator.tick(Utc::now());

    let snapshot = state.snapshot();
    assert_eq!(snapshot.prices["ATOM/USD"].price, dec!(10.03995));
    assert_eq!(snapshot.prices["ATOM/USD"].contributing_providers, 2);
}

#[derive(Debug)]
struct FixedSource(MarketMap);

#[async_trait::async_trait]
impl MarketMapSource for FixedSource {
    async fn fetch(&self) -> Result<MarketMap, OracleError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn research_merge_installs_and_assigns() {
    // Mainnet knows BTC/USD; research proposes BTC/USD (different providers,
    // must lose) and DOGE/USD (new, must be appended).
    let mainnet = MarketMap {
        markets: IndexMap::from([market("BTC/USD", 1, &[("okx_ws", "BTC-USDT")], None)]),
    };

    let research_json: research::ResearchJson = serde_json::from_str(
        r#"
        {
            "BTC": {
                "id": 1,
                "pair": "BTC-USD",
                "exponent": -5,
                "min_price_change_ppm": 1000,
                "min_exchanges": 1,
                "exchange_config_json": [
                    {"exchange_name": "Mexc", "ticker": "BTC_USDT"}
                ],
                "metadata": {"cmc_id": 1}
            },
            "DOGE": {
                "id": 22,
                "pair": "DOGE-USD",
                "exponent": -10,
                "min_price_change_ppm": 2500,
                "min_exchanges": 1,
                "exchange_config_json": [
                    {"exchange_name": "Okx", "ticker": "DOGE-USDT"},
                    {"exchange_name": "Mexc", "ticker": "DOGE_USDT"}
                ],
                "metadata": {"cmc_id": 74}
            }
        }
        "#,
    )
    .unwrap();
    let research_map = research::research_to_market_map(&research_json, false).unwrap();

    let fetcher =
        ResearchMarketMapFetcher::new(FixedSource(mainnet), FixedSource(research_map), false);
    let combined = fetcher.fetch().await.unwrap();

    let registry = Registry::new();
    registry.install(combined).unwrap();

    // Mainnet's BTC/USD provider set is unchanged.
    let snapshot = registry.snapshot();
    assert_eq!(snapshot.markets.len(), 2);
    assert_eq!(
        snapshot.markets["BTC/USD"].provider_configs[0].name,
        "okx_ws"
    );

    // DOGE/USD arrived from research, with venue symbols reshaped.
    let okx = registry.tickers_for("okx_ws");
    let pairs = okx.iter().map(|a| a.pair.to_string()).collect::<Vec<_>>();
    assert_eq!(pairs, vec!["BTC/USD".to_string(), "DOGE/USD".to_string()]);
    assert_eq!(
        registry.resolve("mexc_ws", "DOGEUSDT"),
        Some("DOGE/USD".parse().unwrap())
    );
}

#[tokio::test]
async fn cmc_only_mode_reduces_to_single_provider() {
    // SOL/USD quotes three non-CMC venues (static CMC map has it);
    // BTC/USD quotes a venue plus CMC directly.
    let mainnet = MarketMap {
        markets: IndexMap::from([
            market(
                "SOL/USD",
                3,
                &[
                    ("okx_ws", "SOL-USDT"),
                    ("mexc_ws", "SOLUSDT"),
                    ("kraken_api", "SOLUSD"),
                ],
                None,
            ),
            market(
                "BTC/USD",
                2,
                &[("okx_ws", "BTC-USDT"), ("coinmarketcap", "1")],
                None,
            ),
        ]),
    };
    let research = MarketMap::default();

    let fetcher = ResearchMarketMapFetcher::new(FixedSource(mainnet), FixedSource(research), true);
    let combined = fetcher.fetch().await.unwrap();

    assert_eq!(combined.markets.len(), 2);
    for market in combined.markets.values() {
        assert_eq!(market.ticker.min_provider_count, 1);
        assert_eq!(market.provider_configs.len(), 1);
        assert_eq!(market.provider_configs[0].name, "coinmarketcap");
    }
    assert_eq!(
        combined.markets["SOL/USD"].provider_configs[0].off_chain_ticker,
        "5426"
    );
    assert_eq!(
        combined.markets["BTC/USD"].provider_configs[0].off_chain_ticker,
        "1"
    );
}

#[test]
fn inverted_observation_round_trips_exactly() {
    // invert(invert(p)) == p under Decimal arithmetic for representable
    // inversions.
    let price = dec!(0.000025);
    let inverted = Decimal::ONE / price;
    assert_eq!(Decimal::ONE / inverted, price);
}

#[test]
fn identical_observation_sequences_are_bit_identical() {
    let now = Utc::now();
    let run = || {
        let registry = Arc::new(Registry::new());
        registry
            .install(MarketMap {
                markets: IndexMap::from([market(
                    "BTC/USD",
                    2,
                    &[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")],
                    None,
                )]),
            })
            .unwrap();

        let state = Arc::new(PriceState::new());
        let (tx, rx) = observation_channel(64);
        let mut aggregator = Aggregator::new(
            Arc::clone(&registry),
            Arc::clone(&state),
            vec![rx],
            Duration::from_secs(1),
            Duration::from_secs(30),
        );

        for (provider, price) in [
            ("d", dec!(60099.999999)),
            ("b", dec!(60100.000001)),
            ("a", dec!(60100.000001)),
            ("c", dec!(59000)),
        ] {
            tx.push(ProviderEvent::Price(PriceObservation {
                provider: provider.to_string(),
                pair: "BTC/USD".parse().unwrap(),
                price,
                observed_at: now,
            }));
        }
        aggregator.tick(now);
        state.snapshot().prices["BTC/USD"].clone()
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);
    assert_eq!(first.price, dec!(60100.000000));
}