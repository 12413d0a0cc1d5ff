use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    fmt::{Display, Formatter},
    str::FromStr,
};
use thiserror::Error;

/// Delimiter separating the base and quote sides in the canonical string form
/// of a [`CurrencyPair`].
pub const PAIR_DELIMITER: char = '/';

/// Maximum precision a [`Ticker`] may request for its scaled integer price
/// representation.
pub const MAX_DECIMALS: u64 = 36;

/// Errors raised when constructing or validating the market data model.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum MarketMapError {
    #[error("invalid currency pair: {0}")]
    InvalidCurrencyPair(String),

    #[error("invalid ticker {pair}: {reason}")]
    InvalidTicker { pair: String, reason: String },

    #[error("market {pair} has no provider configs")]
    EmptyProviders { pair: String },

    #[error("market {pair} lists provider {provider} more than once")]
    DuplicateProvider { pair: String, provider: String },

    #[error("market map key {key} does not match its ticker currency pair {pair}")]
    KeyMismatch { key: String, pair: String },

    #[error("market {pair} normalizes by {normalize_by} which is not in the market map")]
    UnresolvedNormalizePair { pair: String, normalize_by: String },

    #[error("normalization references form a cycle involving {0}")]
    NormalizationCycle(String),
}

/// Ordered pair of upper-case currency symbols, eg/ `BTC/USD`.
///
/// Both sides are non-empty and free of the [`PAIR_DELIMITER`]; construction
/// canonicalises to upper-case, so equality is bytewise on the canonical form.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub struct CurrencyPair {
    #[serde(alias = "Base")]
    base: String,
    #[serde(alias = "Quote")]
    quote: String,
}

impl CurrencyPair {
    pub fn new<S>(base: S, quote: S) -> Result<Self, MarketMapError>
    where
        S: Into<String>,
    {
        let base = base.into().to_uppercase();
        let quote = quote.into().to_uppercase();

        for side in [&base, &quote] {
            if side.is_empty() {
                return Err(MarketMapError::InvalidCurrencyPair(format!(
                    "{base}{PAIR_DELIMITER}{quote} has an empty side"
                )));
            }
            if side.contains(PAIR_DELIMITER) {
                return Err(MarketMapError::InvalidCurrencyPair(format!(
                    "side {side} contains the pair delimiter"
                )));
            }
        }

        Ok(Self { base, quote })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl Display for CurrencyPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.base, PAIR_DELIMITER, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = MarketMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split(PAIR_DELIMITER).collect::<Vec<_>>().as_slice() {
            [base, quote] => Self::new(*base, *quote),
            _ => Err(MarketMapError::InvalidCurrencyPair(format!(
                "expected BASE{PAIR_DELIMITER}QUOTE, got: {s}"
            ))),
        }
    }
}

/// A [`CurrencyPair`] plus its canonical precision and publication policy.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct Ticker {
    pub currency_pair: CurrencyPair,
    pub decimals: u64,
    pub min_provider_count: u64,
    pub enabled: bool,
    #[serde(default, alias = "metadata_JSON")]
    pub metadata_json: String,
}

impl Ticker {
    pub fn validate(&self) -> Result<(), MarketMapError> {
        if self.decimals > MAX_DECIMALS {
            return Err(MarketMapError::InvalidTicker {
                pair: self.currency_pair.to_string(),
                reason: format!("decimals {} exceeds {MAX_DECIMALS}", self.decimals),
            });
        }

        if self.enabled && self.min_provider_count == 0 {
            return Err(MarketMapError::InvalidTicker {
                pair: self.currency_pair.to_string(),
                reason: "enabled ticker requires min_provider_count >= 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Per-venue quoting instructions for one market.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Canonical internal provider name, eg/ `mexc_ws`.
    pub name: String,

    /// Venue-specific symbol for the market, eg/ `BTCUSDT`.
    pub off_chain_ticker: String,

    /// Invert the reported price before use, eg/ a `USDT/BTC` feed quoting a
    /// `BTC/USDT` market.
    #[serde(default)]
    pub invert: bool,

    /// Multiply observations by the current aggregated price of this pair to
    /// convert the quote currency, eg/ `USDT/USD`.
    #[serde(default)]
    pub normalize_by_pair: Option<CurrencyPair>,

    /// Venue-interpreted metadata, opaque to the aggregation engine.
    #[serde(default, alias = "metadata_JSON")]
    pub metadata_json: String,
}

/// A [`Ticker`] together with the ordered set of venues quoting it.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct Market {
    pub ticker: Ticker,
    pub provider_configs: Vec<ProviderConfig>,
}

impl Market {
    pub fn validate(&self) -> Result<(), MarketMapError> {
        self.ticker.validate()?;

        let pair = self.ticker.currency_pair.to_string();
        if self.provider_configs.is_empty() {
            return Err(MarketMapError::EmptyProviders { pair });
        }

        let mut seen = std::collections::HashSet::with_capacity(self.provider_configs.len());
        for config in &self.provider_configs {
            if !seen.insert(config.name.as_str()) {
                return Err(MarketMapError::DuplicateProvider {
                    pair: pair.clone(),
                    provider: config.name.clone(),
                });
            }
        }

        Ok(())
    }
}

/// The authoritative mapping from canonical pair string to [`Market`].
///
/// Iteration order is deterministic: [`MarketMap::validate`] sorts keys
/// lexicographically, which also fixes provider subscription ordering across
/// restarts.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct MarketMap {
    #[serde(default)]
    pub markets: IndexMap<String, Market>,
}

impl MarketMap {
    /// Validate the whole map and canonicalise its iteration order.
    ///
    /// Checks, in order: per-market invariants, key/ticker consistency, the
    /// closure property (every `normalize_by_pair` resolves within the map)
    /// and acyclicity of the normalization graph.
    pub fn validate(&mut self) -> Result<(), MarketMapError> {
        for (key, market) in &self.markets {
            market.validate()?;

            let pair = market.ticker.currency_pair.to_string();
            if *key != pair {
                return Err(MarketMapError::KeyMismatch {
                    key: key.clone(),
                    pair,
                });
            }

            for config in &market.provider_configs {
                if let Some(normalize_by) = &config.normalize_by_pair {
                    if !self.markets.contains_key(&normalize_by.to_string()) {
                        return Err(MarketMapError::UnresolvedNormalizePair {
                            pair: pair.clone(),
                            normalize_by: normalize_by.to_string(),
                        });
                    }
                }
            }
        }

        self.normalization_order()?;
        self.markets.sort_unstable_keys();

        Ok(())
    }

    /// Topological order of market keys such that every normalization target
    /// appears before the markets that depend on it.
    ///
    /// Fails with [`MarketMapError::NormalizationCycle`] if the normalization
    /// edges form a cycle, so a successful install always admits the
    /// two-pass aggregation schedule.
    pub fn normalization_order(&self) -> Result<Vec<String>, MarketMapError> {
        // Dependency edges: market -> the pairs its providers normalize by.
        let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(self.markets.len());
        let mut dependants: HashMap<&str, Vec<&str>> = HashMap::new();

        for (key, market) in &self.markets {
            in_degree.entry(key.as_str()).or_insert(0);
            for config in &market.provider_configs {
                if let Some(normalize_by) = &config.normalize_by_pair {
                    let target = normalize_by.to_string();
                    if let Some((target_key, _)) = self.markets.get_key_value(&target) {
                        *in_degree.entry(key.as_str()).or_insert(0) += 1;
                        dependants
                            .entry(target_key.as_str())
                            .or_default()
                            .push(key.as_str());
                    }
                }
            }
        }

        let mut ready = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(key, _)| *key)
            .collect::<Vec<_>>();
        // Lexicographic tie-break keeps the order reproducible across runs.
        ready.sort_unstable();
        let mut ready = VecDeque::from(ready);

        let mut order = Vec::with_capacity(self.markets.len());
        while let Some(key) = ready.pop_front() {
            order.push(key.to_string());

            let mut unlocked = Vec::new();
            for dependant in dependants.remove(key).unwrap_or_default() {
                let degree = in_degree
                    .get_mut(dependant)
                    .expect("dependant was registered with an in-degree");
                *degree -= 1;
                if *degree == 0 {
                    unlocked.push(dependant);
                }
            }
            unlocked.sort_unstable();
            ready.extend(unlocked);
        }

        if order.len() != self.markets.len() {
            let cyclic = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(key, _)| *key)
                .min()
                .unwrap_or_default();
            return Err(MarketMapError::NormalizationCycle(cyclic.to_string()));
        }

        Ok(order)
    }
}
