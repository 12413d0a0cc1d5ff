use crate::market::{
    CurrencyPair, Market, MarketMap, MarketMapError, ProviderConfig, Ticker,
};
use crate::exchange::{coinbase, coinmarketcap, kraken, mexc, okx, polymarket};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Delimiter used by chain market params and the research JSON, eg/ `BTC-USD`.
pub const PARAM_PAIR_DELIMITER: char = '-';

/// Canonical provider name for the Raydium AMM. No runtime adapter ships for
/// it here; markets quoting it are carried through the map for deployments
/// that plug one in.
pub const RAYDIUM_NAME: &str = "raydium_api";

/// Canonical provider name for UniswapV3 on Ethereum mainnet.
pub const UNISWAP_V3_ETHEREUM_NAME: &str = "uniswapv3_api-ethereum";

/// One market as published by the chain's market params query. The
/// `exchange_config_json` field is a string containing an encoded
/// [`ExchangeConfigJson`].
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct MarketParam {
    pub id: u64,
    pub pair: String,
    pub exponent: i64,
    pub min_exchanges: u64,
    pub min_price_change_ppm: u64,
    pub exchange_config_json: String,
}

/// Response shape of the chain's `QueryAllMarketParams`.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct QueryAllMarketParamsResponse {
    #[serde(default)]
    pub market_params: Vec<MarketParam>,
}

/// Decoded form of a market param's `exchange_config_json` string.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct ExchangeConfigJson {
    #[serde(default)]
    pub exchanges: Vec<ExchangeMarketConfig>,
}

/// One venue entry inside an [`ExchangeConfigJson`].
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub struct ExchangeMarketConfig {
    pub exchange_name: String,
    pub ticker: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub invert: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub adjust_by_market: String,
}

/// Map a venue display name used by chain params and the research JSON to
/// the canonical internal provider name.
///
/// Venues absent from this dictionary are silently dropped when converting;
/// the engine cannot serve them.
pub fn canonical_provider_name(display_name: &str) -> Option<&'static str> {
    match display_name {
        "Okx" => Some(okx::NAME),
        "Mexc" => Some(mexc::NAME),
        "CoinbasePro" => Some(coinbase::NAME),
        // API only: the venue WebSocket quotes a different pair universe.
        "Kraken" => Some(kraken::NAME),
        "Polymarket" => Some(polymarket::NAME),
        "CoinMarketCap" | "coinmarketcap" => Some(coinmarketcap::NAME),
        "Raydium" => Some(RAYDIUM_NAME),
        "UniswapV3-Ethereum" => Some(UNISWAP_V3_ETHEREUM_NAME),
        _ => None,
    }
}

/// Parse a delimited chain pair, eg/ `BTC-USD`, into a [`CurrencyPair`].
pub fn currency_pair_from_param_pair(pair: &str) -> Result<CurrencyPair, MarketMapError> {
    match pair.split(PARAM_PAIR_DELIMITER).collect::<Vec<_>>().as_slice() {
        [base, quote] => CurrencyPair::new(*base, *quote),
        _ => Err(MarketMapError::InvalidCurrencyPair(format!(
            "expected BASE{PARAM_PAIR_DELIMITER}QUOTE, got: {pair}"
        ))),
    }
}

/// Build a [`Ticker`] from a chain market param.
///
/// Chain params publish a negative exponent by convention; `decimals` is its
/// negation, so `exponent > 0` is rejected on ingest.
pub fn ticker_from_market_param(param: &MarketParam) -> Result<Ticker, MarketMapError> {
    if param.exponent > 0 {
        return Err(MarketMapError::InvalidTicker {
            pair: param.pair.clone(),
            reason: format!("expected non-positive exponent, got {}", param.exponent),
        });
    }

    let ticker = Ticker {
        currency_pair: currency_pair_from_param_pair(&param.pair)?,
        decimals: param.exponent.unsigned_abs(),
        min_provider_count: param.min_exchanges,
        enabled: true,
        metadata_json: String::new(),
    };
    ticker.validate()?;

    Ok(ticker)
}

/// Reshape a venue ticker where the venue's wire format differs from the
/// form published in chain params.
pub fn convert_denom_by_provider(
    denom: &str,
    provider: &str,
) -> Result<String, MarketMapError> {
    match provider {
        // MEXC WebSocket symbols drop the underscore, eg/ `BTC_USDT` -> `BTCUSDT`.
        mexc::NAME => Ok(denom.replace('_', "")),
        // AMM tickers carry pool fields after the pair; rebuild as BASE/QUOTE.
        RAYDIUM_NAME => {
            let fields = denom.split(PARAM_PAIR_DELIMITER).collect::<Vec<_>>();
            match fields.as_slice() {
                [base, quote, ..] => Ok(CurrencyPair::new(*base, *quote)?.to_string()),
                _ => Err(MarketMapError::InvalidCurrencyPair(format!(
                    "expected at least 2 fields in {provider} ticker: {denom}"
                ))),
            }
        }
        _ => Ok(denom.to_string()),
    }
}

/// Venue-specific metadata attached to a provider config on conversion.
fn extract_metadata(
    provider: &str,
    config: &ExchangeMarketConfig,
) -> Result<String, MarketMapError> {
    if provider.starts_with("uniswapv3_api") {
        // The pool address and inversion ride along for the AMM client.
        return Ok(json!({
            "address": config.ticker,
            "base_decimals": 18,
            "quote_decimals": 18,
            "invert": config.invert,
        })
        .to_string());
    }
    Ok(String::new())
}

/// Convert an [`ExchangeConfigJson`] into provider configs, dropping
/// duplicates and venues the dictionary does not recognise.
pub fn convert_exchange_config_json(
    config: &ExchangeConfigJson,
) -> Result<Vec<ProviderConfig>, MarketMapError> {
    let mut providers = Vec::with_capacity(config.exchanges.len());
    let mut seen = std::collections::HashSet::new();

    for entry in &config.exchanges {
        if !seen.insert(entry.clone()) {
            continue;
        }

        let Some(provider) = canonical_provider_name(&entry.exchange_name) else {
            continue;
        };

        let normalize_by_pair = if entry.adjust_by_market.is_empty() {
            None
        } else {
            Some(currency_pair_from_param_pair(&entry.adjust_by_market)?)
        };

        let off_chain_ticker = convert_denom_by_provider(&entry.ticker, provider)?;
        let metadata_json = extract_metadata(provider, entry)?;

        providers.push(ProviderConfig {
            name: provider.to_string(),
            off_chain_ticker,
            invert: entry.invert,
            normalize_by_pair,
            metadata_json,
        });
    }

    Ok(providers)
}

/// Convert a chain market params response into a [`MarketMap`].
pub fn market_params_to_market_map(
    params: &QueryAllMarketParamsResponse,
) -> Result<MarketMap, MarketMapError> {
    let mut markets = IndexMap::with_capacity(params.market_params.len());

    for param in &params.market_params {
        let ticker = ticker_from_market_param(param)?;

        let exchange_config: ExchangeConfigJson = serde_json::from_str(
            &param.exchange_config_json,
        )
        .map_err(|error| MarketMapError::InvalidTicker {
            pair: param.pair.clone(),
            reason: format!("undecodable exchange config: {error}"),
        })?;

        let provider_configs = convert_exchange_config_json(&exchange_config)?;

        markets.insert(
            ticker.currency_pair.to_string(),
            Market {
                ticker,
                provider_configs,
            },
        );
    }

    Ok(MarketMap { markets })
}
