use super::{MarketMapSource, static_cmc};
use crate::{
    error::OracleError,
    exchange::coinmarketcap,
    market::MarketMap,
};
use indexmap::IndexMap;
use tracing::{debug, info};

/// Composes the external mainnet market map with the research overlay.
///
/// Both sources are fetched in parallel. Failure policy: a mainnet failure is
/// surfaced and any research result discarded; otherwise a research failure
/// is surfaced; otherwise the merge starts from mainnet's markets and appends
/// every research ticker not already present.
#[derive(Debug)]
pub struct ResearchMarketMapFetcher<Mainnet, Research> {
    mainnet: Mainnet,
    research: Research,
    cmc_only: bool,
}

impl<Mainnet, Research> ResearchMarketMapFetcher<Mainnet, Research>
where
    Mainnet: MarketMapSource,
    Research: MarketMapSource,
{
    pub fn new(mainnet: Mainnet, research: Research, cmc_only: bool) -> Self {
        Self {
            mainnet,
            research,
            cmc_only,
        }
    }

    pub async fn fetch(&self) -> Result<MarketMap, OracleError> {
        let (mainnet, research) = tokio::join!(self.mainnet.fetch(), self.research.fetch());

        // Mainnet failure wins; the research result is discarded with it.
        let mut combined = mainnet?;
        let research = research?;

        for (key, market) in research.markets {
            if !combined.markets.contains_key(&key) {
                debug!(ticker = %key, "adding market from research overlay");
                combined.markets.insert(key, market);
            }
        }

        if self.cmc_only {
            apply_cmc_only(&mut combined);
        }

        // Validate the combined map before surfacing it; a failure here
        // leaves the previously installed map in place upstream.
        combined.validate()?;

        Ok(combined)
    }
}

/// Force every market onto a single CoinMarketCap provider with
/// `min_provider_count = 1`.
///
/// Markets that do not already quote CMC fall back to the embedded static
/// CMC map; markets absent there too are deleted from the output.
pub fn apply_cmc_only(map: &mut MarketMap) {
    let markets = std::mem::take(&mut map.markets);
    let mut kept = IndexMap::with_capacity(markets.len());

    for (key, mut market) in markets {
        market.ticker.min_provider_count = 1;

        if let Some(cmc) = market
            .provider_configs
            .iter()
            .find(|config| config.name == coinmarketcap::NAME)
        {
            market.provider_configs = vec![cmc.clone()];
        } else if let Some(static_market) = static_cmc::CMC_MARKET_MAP.markets.get(&key) {
            market.provider_configs = static_market.provider_configs.clone();
        } else {
            info!(ticker = %key, "did not find CMC market for ticker, dropping");
            continue;
        }

        kept.insert(key, market);
    }

    map.markets = kept;
}
