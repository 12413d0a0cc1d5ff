use serde::{Deserialize, Serialize};

/// Opaque ticker metadata published alongside markets on the chain.
///
/// The aggregation engine never interprets these values; they ride through
/// the market map so downstream consumers (listing tooling, indexers) can
/// read them off the installed map.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct TickerMetadata {
    /// Spot price at the point in time the metadata was last updated, scaled
    /// by the ticker's decimals. Not suitable for instantaneous pricing.
    #[serde(default)]
    pub reference_price: u64,

    /// Rough USD-denominated estimate of provider liquidity for the market.
    /// Order-of-magnitude accuracy only.
    #[serde(default)]
    pub liquidity: u64,

    /// Aggregator indexes tracking this ticker, if any.
    #[serde(default)]
    pub aggregate_ids: Vec<AggregatorId>,

    /// Whether the market should launch cross-margin instead of isolated.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cross_launch: bool,
}

/// An aggregator index entry: which venue indexes the ticker, under what id.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct AggregatorId {
    pub venue: String,
    #[serde(rename = "ID")]
    pub id: String,
}

impl TickerMetadata {
    /// Parse metadata from the opaque JSON string carried on a ticker.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Encode metadata to the opaque JSON string form.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
