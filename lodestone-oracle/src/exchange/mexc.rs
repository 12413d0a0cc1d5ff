use super::{WsAdapter, WsEvent};
use crate::{
    error::ErrorCode,
    provider::{Endpoint, WebSocketConfig},
    registry::ProviderAssignment,
};
use lodestone_integration::{
    error::TransportError,
    protocol::websocket::{FramePayload, WsMessage, decode_json, decode_protobuf},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

pub const NAME: &str = "mexc_ws";

/// See docs: <https://mexcdevelop.github.io/apidocs/spot_v3_en/#websocket-market-streams>
pub const URL: &str = "wss://wbs-api.mexc.com/ws";

/// Channel prefix for the protobuf mini-ticker stream.
pub const MINI_TICKER_CHANNEL: &str = "spot@public.miniTicker.v3.api.pb@";

/// MEXC rejects subscription batches above 30 channels per connection.
pub const MAX_SUBSCRIPTIONS_PER_CONNECTION: usize = 30;

pub fn default_ws_config() -> WebSocketConfig {
    WebSocketConfig {
        name: NAME.to_string(),
        enabled: true,
        max_queries: 1,
        reconnection_timeout_ms: 10_000,
        post_connection_timeout_ms: 1_000,
        handshake_timeout_ms: 10_000,
        read_timeout_ms: 45_000,
        write_timeout_ms: 10_000,
        write_interval_ms: 100,
        ping_interval_ms: 20_000,
        max_read_error_count: 5,
        max_subscriptions_per_connection: MAX_SUBSCRIPTIONS_PER_CONNECTION,
        max_subscriptions_per_batch: 25,
        enable_compression: false,
        read_buffer_size: 4096,
        write_buffer_size: 4096,
        endpoints: vec![Endpoint::new(URL)],
    }
}

/// MEXC spot WebSocket adapter.
///
/// Price updates arrive as binary protobuf mini-ticker frames; subscription
/// acknowledgements and heartbeat answers arrive as JSON text frames. Binary
/// frames are decoded protobuf-first with a JSON fallback.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct MexcWs;

/// Protobuf mini-ticker payload pushed on the
/// `spot@public.miniTicker.v3.api.pb` channel.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PublicMiniTickerV3Api {
    #[prost(string, tag = "1")]
    pub symbol: String,
    #[prost(string, tag = "2")]
    pub price: String,
}

/// ### Raw Payload Examples
/// ```json
/// {"id": 0, "code": 0, "msg": "spot@public.miniTicker.v3.api.pb@BTCUSDT@UTC+8"}
/// ```
/// ```json
/// {"id": 0, "code": 0, "msg": "PONG"}
/// ```
#[derive(Debug, Deserialize)]
struct MexcControlMessage {
    #[serde(default)]
    msg: String,
}

impl MexcWs {
    fn control_event(message: MexcControlMessage) -> Result<Vec<WsEvent>, TransportError> {
        if message.msg == "PONG" {
            return Ok(vec![WsEvent::Pong]);
        }

        if message.msg.starts_with(MINI_TICKER_CHANNEL) {
            return Ok(vec![WsEvent::SubscriptionAck {
                detail: message.msg,
            }]);
        }

        Err(TransportError::Venue(format!(
            "invalid message type: {}",
            message.msg
        )))
    }

    fn ticker_event(ticker: PublicMiniTickerV3Api) -> Vec<WsEvent> {
        match ticker.price.parse::<Decimal>() {
            Ok(price) => vec![WsEvent::Price {
                off_chain_ticker: ticker.symbol,
                price,
            }],
            Err(error) => vec![WsEvent::PriceError {
                off_chain_ticker: ticker.symbol,
                code: ErrorCode::FailedToParsePrice,
                detail: error.to_string(),
            }],
        }
    }
}

impl WsAdapter for MexcWs {
    fn name(&self) -> &'static str {
        NAME
    }

    fn subscribe_messages(
        &self,
        assignments: &[ProviderAssignment],
    ) -> Result<Vec<WsMessage>, TransportError> {
        let channels = assignments
            .iter()
            .map(|assignment| {
                format!(
                    "{MINI_TICKER_CHANNEL}{}@UTC+8",
                    assignment.off_chain_ticker.to_uppercase()
                )
            })
            .collect::<Vec<_>>();

        Ok(vec![WsMessage::text(
            json!({
                "method": "SUBSCRIPTION",
                "params": channels,
            })
            .to_string(),
        )])
    }

    fn handle_frame(&self, payload: FramePayload) -> Result<Vec<WsEvent>, TransportError> {
        match payload {
            // Most updates are protobuf mini-tickers; anything else binary is
            // retried as a JSON control message.
            FramePayload::Binary(binary) => {
                match decode_protobuf::<PublicMiniTickerV3Api>(&binary) {
                    Ok(ticker) => Ok(Self::ticker_event(ticker)),
                    Err(_) => {
                        let text = String::from_utf8(binary.to_vec()).map_err(|error| {
                            TransportError::Venue(format!("undecodable binary frame: {error}"))
                        })?;
                        Self::control_event(decode_json::<MexcControlMessage>(&text)?)
                    }
                }
            }
            FramePayload::Text(text) => {
                Self::control_event(decode_json::<MexcControlMessage>(&text)?)
            }
        }
    }

    fn heartbeat(&self) -> Option<WsMessage> {
        Some(WsMessage::text(json!({"method": "PING"}).to_string()))
    }
}
