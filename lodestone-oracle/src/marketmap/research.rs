use super::convert::{
    ExchangeConfigJson, ExchangeMarketConfig, MarketParam, QueryAllMarketParamsResponse,
    market_params_to_market_map,
};
use crate::market::{MarketMap, MarketMapError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The research JSON: a top-level object keyed by display symbol, each value
/// describing one candidate market.
///
/// A `BTreeMap` keeps conversion order independent of the publisher's key
/// ordering.
pub type ResearchJson = BTreeMap<String, ResearchEntry>;

/// ### Raw Payload Example
/// ```json
/// {
///   "DOGE": {
///     "id": 22,
///     "pair": "DOGE-USD",
///     "exponent": -10,
///     "min_price_change_ppm": 2500,
///     "min_exchanges": 2,
///     "exchange_config_json": [
///       {"exchange_name": "Okx", "ticker": "DOGE-USDT", "adjust_by_market": "USDT-USD"}
///     ],
///     "metadata": {"cmc_id": 74}
///   }
/// }
/// ```
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct ResearchEntry {
    pub id: u64,
    pub pair: String,
    pub exponent: i64,
    #[serde(default)]
    pub min_price_change_ppm: u64,
    pub min_exchanges: u64,
    #[serde(default)]
    pub exchange_config_json: Vec<ExchangeMarketConfig>,
    #[serde(default)]
    pub metadata: ResearchMetadata,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct ResearchMetadata {
    #[serde(default)]
    pub cmc_id: Option<i64>,
}

/// Interpret a research JSON as a [`MarketMap`].
///
/// In CMC-only mode every entry's venue list is replaced with a single
/// CoinMarketCap provider quoting the entry's CMC id, `min_provider_count`
/// is forced to 1, and entries without a positive CMC id are skipped.
pub fn research_to_market_map(
    research: &ResearchJson,
    cmc_only: bool,
) -> Result<MarketMap, MarketMapError> {
    let mut params = QueryAllMarketParamsResponse::default();

    for entry in research.values() {
        let cmc_id = entry.metadata.cmc_id.unwrap_or(-1);
        if cmc_only && cmc_id <= 0 {
            continue;
        }

        let exchange_config = if cmc_only {
            ExchangeConfigJson {
                exchanges: vec![ExchangeMarketConfig {
                    exchange_name: "CoinMarketCap".to_string(),
                    ticker: cmc_id.to_string(),
                    invert: false,
                    adjust_by_market: String::new(),
                }],
            }
        } else {
            ExchangeConfigJson {
                exchanges: entry.exchange_config_json.clone(),
            }
        };

        let exchange_config_json =
            serde_json::to_string(&exchange_config).map_err(|error| {
                MarketMapError::InvalidTicker {
                    pair: entry.pair.clone(),
                    reason: format!("unencodable exchange config: {error}"),
                }
            })?;

        params.market_params.push(MarketParam {
            id: entry.id,
            pair: entry.pair.clone(),
            exponent: entry.exponent,
            min_exchanges: if cmc_only { 1 } else { entry.min_exchanges },
            min_price_change_ppm: entry.min_price_change_ppm,
            exchange_config_json,
        });
    }

    market_params_to_market_map(&params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::coinmarketcap;

    fn research_fixture() -> ResearchJson {
        serde_json::from_str(
            r#"
            {
                "DOGE": {
                    "id": 22,
                    "pair": "DOGE-USD",
                    "exponent": -10,
                    "min_price_change_ppm": 2500,
                    "min_exchanges": 2,
                    "exchange_config_json": [
                        {"exchange_name": "Okx", "ticker": "DOGE-USDT", "adjust_by_market": "USDT-USD"},
                        {"exchange_name": "Mexc", "ticker": "DOGE_USDT", "adjust_by_market": "USDT-USD"}
                    ],
                    "metadata": {"cmc_id": 74}
                },
                "OBSCURE": {
                    "id": 99,
                    "pair": "OBSCURE-USD",
                    "exponent": -8,
                    "min_price_change_ppm": 2500,
                    "min_exchanges": 1,
                    "exchange_config_json": [
                        {"exchange_name": "Okx", "ticker": "OBSCURE-USDT", "adjust_by_market": "USDT-USD"}
                    ],
                    "metadata": {}
                }
            }
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_research_to_market_map() {
        let map = research_to_market_map(&research_fixture(), false).unwrap();

        let doge = &map.markets["DOGE/USD"];
        assert_eq!(doge.ticker.decimals, 10);
        assert_eq!(doge.ticker.min_provider_count, 2);
        assert_eq!(doge.provider_configs.len(), 2);
        assert_eq!(doge.provider_configs[1].off_chain_ticker, "DOGEUSDT");

        assert!(map.markets.contains_key("OBSCURE/USD"));
    }

    #[test]
    fn test_research_cmc_only_mode() {
        let map = research_to_market_map(&research_fixture(), true).unwrap();

        // OBSCURE has no CMC id: skipped on ingest.
        assert!(!map.markets.contains_key("OBSCURE/USD"));

        let doge = &map.markets["DOGE/USD"];
        assert_eq!(doge.ticker.min_provider_count, 1);
        assert_eq!(doge.provider_configs.len(), 1);
        assert_eq!(doge.provider_configs[0].name, coinmarketcap::NAME);
        assert_eq!(doge.provider_configs[0].off_chain_ticker, "74");
    }

    #[test]
    fn test_research_round_trip_is_stable() {
        let map = research_to_market_map(&research_fixture(), false).unwrap();

        let encoded = serde_json::to_string(&map).unwrap();
        let reparsed: MarketMap = serde_json::from_str(&encoded).unwrap();
        assert_eq!(map, reparsed);

        let re_encoded = serde_json::to_string(&reparsed).unwrap();
        assert_eq!(encoded, re_encoded);
    }
}
