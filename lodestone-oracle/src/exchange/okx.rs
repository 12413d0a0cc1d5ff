use super::{WsAdapter, WsEvent};
use crate::{
    error::ErrorCode,
    provider::{Endpoint, WebSocketConfig},
    registry::ProviderAssignment,
};
use lodestone_integration::{
    error::TransportError,
    protocol::websocket::{FramePayload, WsMessage, decode_json},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

pub const NAME: &str = "okx_ws";

/// See docs: <https://www.okx.com/docs-v5/en/#overview-websocket-overview>
pub const URL: &str = "wss://ws.okx.com:8443/ws/v5/public";

/// OKX allows 3 outbound messages per second; pace writes accordingly.
pub const WRITE_INTERVAL_MS: u64 = 3_000;

pub const MAX_SUBSCRIPTIONS_PER_CONNECTION: usize = 50;

pub const MAX_SUBSCRIPTIONS_PER_BATCH: usize = 25;

pub fn default_ws_config() -> WebSocketConfig {
    WebSocketConfig {
        name: NAME.to_string(),
        enabled: true,
        max_queries: 1,
        reconnection_timeout_ms: 10_000,
        post_connection_timeout_ms: 1_000,
        handshake_timeout_ms: 10_000,
        // OKX closes connections idle for 30s; read under that and ping to
        // keep the stream alive.
        read_timeout_ms: 15_000,
        write_timeout_ms: 10_000,
        write_interval_ms: WRITE_INTERVAL_MS,
        ping_interval_ms: 25_000,
        max_read_error_count: 5,
        max_subscriptions_per_connection: MAX_SUBSCRIPTIONS_PER_CONNECTION,
        max_subscriptions_per_batch: MAX_SUBSCRIPTIONS_PER_BATCH,
        enable_compression: false,
        read_buffer_size: 4096,
        write_buffer_size: 4096,
        endpoints: vec![Endpoint::new(URL)],
    }
}

/// OKX public tickers WebSocket adapter.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct OkxWs;

/// ### Raw Payload Examples
/// Subscription acknowledgement:
/// ```json
/// {"event": "subscribe", "arg": {"channel": "tickers", "instId": "BTC-USDT"}}
/// ```
/// Ticker update:
/// ```json
/// {
///   "arg": {"channel": "tickers", "instId": "BTC-USDT"},
///   "data": [{"instId": "BTC-USDT", "last": "42219.9"}]
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OkxMessage {
    Event(OkxEvent),
    Tickers(OkxTickers),
}

#[derive(Debug, Deserialize)]
struct OkxEvent {
    event: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    arg: Option<OkxArg>,
}

#[derive(Debug, Deserialize)]
struct OkxArg {
    #[serde(rename = "instId")]
    inst_id: String,
}

#[derive(Debug, Deserialize)]
struct OkxTickers {
    #[allow(dead_code)]
    arg: OkxArg,
    data: Vec<OkxTicker>,
}

#[derive(Debug, Deserialize)]
struct OkxTicker {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    last: Decimal,
}

impl WsAdapter for OkxWs {
    fn name(&self) -> &'static str {
        NAME
    }

    fn subscribe_messages(
        &self,
        assignments: &[ProviderAssignment],
    ) -> Result<Vec<WsMessage>, TransportError> {
        let args = assignments
            .iter()
            .map(|assignment| {
                json!({
                    "channel": "tickers",
                    "instId": assignment.off_chain_ticker,
                })
            })
            .collect::<Vec<_>>();

        Ok(vec![WsMessage::text(
            json!({
                "op": "subscribe",
                "args": args,
            })
            .to_string(),
        )])
    }

    fn handle_frame(&self, payload: FramePayload) -> Result<Vec<WsEvent>, TransportError> {
        let text = match payload {
            FramePayload::Text(text) => text,
            FramePayload::Binary(_) => {
                return Err(TransportError::Venue(
                    "unexpected binary frame from OKX".to_string(),
                ));
            }
        };

        // Heartbeats are answered with a bare "pong" text frame.
        if text == "pong" {
            return Ok(vec![WsEvent::Pong]);
        }

        match decode_json::<OkxMessage>(&text)? {
            OkxMessage::Event(event) => match event.event.as_str() {
                "subscribe" => Ok(vec![WsEvent::SubscriptionAck {
                    detail: event
                        .arg
                        .map(|arg| arg.inst_id)
                        .unwrap_or_default(),
                }]),
                "error" => Err(TransportError::Venue(event.msg)),
                _ => Ok(vec![]),
            },
            OkxMessage::Tickers(tickers) => Ok(tickers
                .data
                .into_iter()
                .map(|ticker| {
                    if ticker.last.is_zero() {
                        WsEvent::PriceError {
                            off_chain_ticker: ticker.inst_id,
                            code: ErrorCode::MissingPrice,
                            detail: "venue reported a zero price".to_string(),
                        }
                    } else {
                        WsEvent::Price {
                            off_chain_ticker: ticker.inst_id,
                            price: ticker.last,
                        }
                    }
                })
                .collect()),
        }
    }

    fn heartbeat(&self) -> Option<WsMessage> {
        Some(WsMessage::text("ping"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::ProviderConfig;
    use rust_decimal_macros::dec;

    fn assignment(off_chain: &str) -> ProviderAssignment {
        ProviderAssignment {
            pair: "BTC/USD".parse().unwrap(),
            off_chain_ticker: off_chain.to_string(),
            config: ProviderConfig {
                name: NAME.to_string(),
                off_chain_ticker: off_chain.to_string(),
                invert: false,
                normalize_by_pair: None,
                metadata_json: String::new(),
            },
        }
    }

    #[test]
    fn test_subscribe_messages_payload() {
        let messages = OkxWs.subscribe_messages(&[assignment("BTC-USDT")]).unwrap();
        let WsMessage::Text(text) = &messages[0] else {
            panic!("expected text frame");
        };
        assert_eq!(
            text.as_str(),
            r#"{"args":[{"channel":"tickers","instId":"BTC-USDT"}],"op":"subscribe"}"#
        );
    }

    #[test]
    fn test_handle_ticker_update() {
        let input = r#"
        {
            "arg": {"channel": "tickers", "instId": "BTC-USDT"},
            "data": [{"instId": "BTC-USDT", "last": "42219.9"}]
        }
        "#;
        let events = OkxWs
            .handle_frame(FramePayload::Text(input.to_string()))
            .unwrap();
        assert_eq!(
            events,
            vec![WsEvent::Price {
                off_chain_ticker: "BTC-USDT".to_string(),
                price: dec!(42219.9),
            }]
        );
    }

    #[test]
    fn test_handle_subscribe_ack() {
        let input = r#"{"event": "subscribe", "arg": {"channel": "tickers", "instId": "BTC-USDT"}}"#;
        let events = OkxWs
            .handle_frame(FramePayload::Text(input.to_string()))
            .unwrap();
        assert_eq!(
            events,
            vec![WsEvent::SubscriptionAck {
                detail: "BTC-USDT".to_string(),
            }]
        );
    }

    #[test]
    fn test_handle_error_event() {
        let input = r#"{"event": "error", "code": "60012", "msg": "Illegal request"}"#;
        assert!(
            OkxWs
                .handle_frame(FramePayload::Text(input.to_string()))
                .is_err()
        );
    }

    #[test]
    fn test_handle_pong() {
        let events = OkxWs
            .handle_frame(FramePayload::Text("pong".to_string()))
            .unwrap();
        assert_eq!(events, vec![WsEvent::Pong]);
    }
}
