use crate::market::MarketMapError;
use lodestone_integration::error::TransportError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Taxonomy of error codes surfaced on observations and in logs.
///
/// Codes attach to a `(provider, ticker)` pair and reduce the contributing
/// set for that aggregation tick; they never propagate past the provider
/// that produced them.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize, Error,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[error("unknown")]
    Unknown,

    #[error("api_general")]
    ApiGeneral,

    #[error("invalid_api_chains")]
    InvalidApiChains,

    #[error("failed_to_decode")]
    FailedToDecode,

    #[error("failed_to_parse_price")]
    FailedToParsePrice,

    #[error("invalid_response")]
    InvalidResponse,

    #[error("missing_price")]
    MissingPrice,

    #[error("invert_by_zero")]
    InvertByZero,

    #[error("connection_lost")]
    ConnectionLost,

    #[error("subscribe_failed")]
    SubscribeFailed,

    #[error("invalid_market_map")]
    InvalidMarketMap,

    #[error("normalization_cycle")]
    NormalizationCycle,

    #[error("stale_observation")]
    StaleObservation,
}

impl From<&TransportError> for ErrorCode {
    fn from(error: &TransportError) -> Self {
        match error {
            TransportError::DeserialiseJson { .. } | TransportError::DeserialiseProtobuf { .. } => {
                ErrorCode::FailedToDecode
            }
            TransportError::HttpResponse(_, _) => ErrorCode::InvalidResponse,
            TransportError::Http(_) | TransportError::HttpTimeout(_) => ErrorCode::ApiGeneral,
            TransportError::WebSocket(_) | TransportError::Terminated(_) => {
                ErrorCode::ConnectionLost
            }
            TransportError::Subscribe(_) => ErrorCode::SubscribeFailed,
            _ => ErrorCode::Unknown,
        }
    }
}

impl From<&MarketMapError> for ErrorCode {
    fn from(error: &MarketMapError) -> Self {
        match error {
            MarketMapError::NormalizationCycle(_) => ErrorCode::NormalizationCycle,
            _ => ErrorCode::InvalidMarketMap,
        }
    }
}

/// All errors generated in `lodestone-oracle`.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid market map: {0}")]
    MarketMap(#[from] MarketMapError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("provider {provider} failed: {detail}")]
    Provider { provider: String, detail: String },

    #[error("rpc server error: {0}")]
    Rpc(#[from] std::io::Error),
}

impl OracleError {
    /// Determine if the error is fatal for the whole process at startup.
    ///
    /// Fatal startup errors abort with a non-zero exit code; everything else
    /// is scoped to the provider or install attempt that produced it.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            OracleError::Config(_) | OracleError::MarketMap(_) | OracleError::Rpc(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serialises_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::FailedToParsePrice).unwrap(),
            "\"failed_to_parse_price\""
        );
        assert_eq!(ErrorCode::InvertByZero.to_string(), "invert_by_zero");
    }

    #[test]
    fn test_market_map_error_code_mapping() {
        assert_eq!(
            ErrorCode::from(&MarketMapError::NormalizationCycle("A/USD".to_string())),
            ErrorCode::NormalizationCycle
        );
        assert_eq!(
            ErrorCode::from(&MarketMapError::InvalidCurrencyPair("x".to_string())),
            ErrorCode::InvalidMarketMap
        );
    }
}
