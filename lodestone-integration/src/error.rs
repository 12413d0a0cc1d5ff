use reqwest::Error;
use thiserror::Error;

/// All transport IO related errors generated in `lodestone-integration`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("deserialising JSON error: {error} for payload: {payload}")]
    DeserialiseJson {
        error: serde_json::Error,
        payload: String,
    },

    #[error("deserialising protobuf error: {error} for binary payload of {payload_len} bytes")]
    DeserialiseProtobuf {
        error: prost::DecodeError,
        payload_len: usize,
    },

    #[error("serialising JSON error: {0}")]
    Serialise(serde_json::Error),

    #[error("error parsing Url: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("error subscribing to resources over the socket: {0}")]
    Subscribe(String),

    #[error("venue stream terminated with closing frame: {0}")]
    Terminated(String),

    #[error("{entity} does not support: {item}")]
    Unsupported { entity: &'static str, item: String },

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("HTTP request timed out: {0}")]
    HttpTimeout(reqwest::Error),

    #[error("HTTP response (status={0}) error: {1}")]
    HttpResponse(reqwest::StatusCode, String),

    #[error("consumed unidentifiable message: {0}")]
    Unidentifiable(String),

    #[error("consumed error message from venue: {0}")]
    Venue(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: Error) -> Self {
        match error {
            error if error.is_timeout() => TransportError::HttpTimeout(error),
            error => TransportError::Http(error),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocket(Box::new(error))
    }
}
