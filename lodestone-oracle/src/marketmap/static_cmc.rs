use crate::market::MarketMap;
use std::sync::LazyLock;

/// Embedded CoinMarketCap market map used by CMC-only mode to supply a CMC
/// provider for markets that do not already quote one.
///
/// Off-chain tickers are CMC numeric ids. The set tracks the majors plus the
/// stable/index pairs that commonly appear as normalization targets; markets
/// absent here are deleted from a CMC-only output.
pub static CMC_MARKET_MAP: LazyLock<MarketMap> = LazyLock::new(|| {
    let mut map: MarketMap =
        serde_json::from_str(CMC_MARKET_MAP_JSON).expect("embedded CMC market map parses");
    map.validate().expect("embedded CMC market map validates");
    map
});

const CMC_MARKET_MAP_JSON: &str = r#"
{
    "markets": {
        "BTC/USD": {
            "ticker": {
                "currency_pair": {"base": "BTC", "quote": "USD"},
                "decimals": 5,
                "min_provider_count": 1,
                "enabled": true
            },
            "provider_configs": [
                {"name": "coinmarketcap", "off_chain_ticker": "1"}
            ]
        },
        "ETH/USD": {
            "ticker": {
                "currency_pair": {"base": "ETH", "quote": "USD"},
                "decimals": 6,
                "min_provider_count": 1,
                "enabled": true
            },
            "provider_configs": [
                {"name": "coinmarketcap", "off_chain_ticker": "1027"}
            ]
        },
        "SOL/USD": {
            "ticker": {
                "currency_pair": {"base": "SOL", "quote": "USD"},
                "decimals": 8,
                "min_provider_count": 1,
                "enabled": true
            },
            "provider_configs": [
                {"name": "coinmarketcap", "off_chain_ticker": "5426"}
            ]
        },
        "USDT/USD": {
            "ticker": {
                "currency_pair": {"base": "USDT", "quote": "USD"},
                "decimals": 9,
                "min_provider_count": 1,
                "enabled": true
            },
            "provider_configs": [
                {"name": "coinmarketcap", "off_chain_ticker": "825"}
            ]
        },
        "ATOM/USD": {
            "ticker": {
                "currency_pair": {"base": "ATOM", "quote": "USD"},
                "decimals": 8,
                "min_provider_count": 1,
                "enabled": true
            },
            "provider_configs": [
                {"name": "coinmarketcap", "off_chain_ticker": "3794"}
            ]
        },
        "DOGE/USD": {
            "ticker": {
                "currency_pair": {"base": "DOGE", "quote": "USD"},
                "decimals": 10,
                "min_provider_count": 1,
                "enabled": true
            },
            "provider_configs": [
                {"name": "coinmarketcap", "off_chain_ticker": "74"}
            ]
        },
        "DYDX/USD": {
            "ticker": {
                "currency_pair": {"base": "DYDX", "quote": "USD"},
                "decimals": 9,
                "min_provider_count": 1,
                "enabled": true
            },
            "provider_configs": [
                {"name": "coinmarketcap", "off_chain_ticker": "28324"}
            ]
        }
    }
}
"#;
