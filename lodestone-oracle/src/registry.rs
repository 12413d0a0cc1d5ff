use crate::market::{CurrencyPair, MarketMap, MarketMapError, ProviderConfig};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// One ticker assigned to a provider: the canonical pair, the venue symbol to
/// subscribe or poll with, and the full per-venue quoting instructions.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ProviderAssignment {
    pub pair: CurrencyPair,
    pub off_chain_ticker: String,
    pub config: ProviderConfig,
}

/// Process-wide mapping from the installed [`MarketMap`] to "the set of
/// tickers each provider must serve".
///
/// Writers replace the map via atomic `Arc` swap; readers clone the `Arc`
/// once per operation and never hold the lock across I/O.
#[derive(Debug, Default)]
pub struct Registry {
    installed: RwLock<Arc<MarketMap>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and atomically install a new [`MarketMap`].
    ///
    /// On validation failure the previously installed map stays in place.
    /// Installing an identical map is observationally indistinguishable from
    /// installing it once.
    pub fn install(&self, mut market_map: MarketMap) -> Result<(), MarketMapError> {
        market_map.validate()?;

        let markets = market_map.markets.len();
        *self.installed.write() = Arc::new(market_map);
        info!(markets, "installed market map");

        Ok(())
    }

    /// Immutable snapshot of the currently installed map.
    pub fn snapshot(&self) -> Arc<MarketMap> {
        Arc::clone(&self.installed.read())
    }

    /// Tickers the named provider must serve, in lexicographic
    /// [`CurrencyPair`] order so subscription ordering is stable across
    /// restarts.
    pub fn tickers_for(&self, provider: &str) -> Vec<ProviderAssignment> {
        let snapshot = self.snapshot();

        // Installed maps are key-sorted, so iteration is already ordered.
        snapshot
            .markets
            .values()
            .filter(|market| market.ticker.enabled)
            .flat_map(|market| {
                market
                    .provider_configs
                    .iter()
                    .filter(|config| config.name == provider)
                    .map(|config| ProviderAssignment {
                        pair: market.ticker.currency_pair.clone(),
                        off_chain_ticker: config.off_chain_ticker.clone(),
                        config: config.clone(),
                    })
            })
            .collect()
    }

    /// Translate a venue symbol back to the canonical pair it quotes.
    pub fn resolve(&self, provider: &str, off_chain_ticker: &str) -> Option<CurrencyPair> {
        let snapshot = self.snapshot();

        snapshot.markets.values().find_map(|market| {
            market
                .provider_configs
                .iter()
                .any(|config| {
                    config.name == provider && config.off_chain_ticker == off_chain_ticker
                })
                .then(|| market.ticker.currency_pair.clone())
        })
    }

    /// Names of every provider referenced by the installed map.
    pub fn provider_names(&self) -> Vec<String> {
        let snapshot = self.snapshot();

        let mut names = snapshot
            .markets
            .values()
            .flat_map(|market| {
                market
                    .provider_configs
                    .iter()
                    .map(|config| config.name.clone())
            })
            .collect::<Vec<_>>();
        names.sort_unstable();
        names.dedup();
        names
    }
}
