use crate::error::TransportError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, connect_async,
    tungstenite::{
        client::IntoClientRequest, error::ProtocolError, protocol::CloseFrame,
    },
};
use tracing::debug;

/// Convenient type alias for a tungstenite `WebSocketStream`.
pub type WebSocket = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Convenient type alias for the `Sink` half of a tungstenite [`WebSocket`].
pub type WsSink = futures::stream::SplitSink<WebSocket, WsMessage>;

/// Convenient type alias for the `Stream` half of a tungstenite [`WebSocket`].
pub type WsStream = futures::stream::SplitStream<WebSocket>;

/// Communicative type alias for a tungstenite [`WebSocket`] `Message`.
pub type WsMessage = tokio_tungstenite::tungstenite::Message;

/// Communicative type alias for a tungstenite [`WebSocket`] `Error`.
pub type WsError = tokio_tungstenite::tungstenite::Error;

/// Application-relevant payload extracted from a raw [`WsMessage`].
///
/// Control frames (ping, pong, fragments) are absorbed here so that venue
/// adapters only ever see data payloads and close frames.
#[derive(Debug, Clone)]
pub enum FramePayload {
    /// Utf-8 text payload, most commonly JSON.
    Text(String),
    /// Binary payload, most commonly protobuf.
    Binary(Bytes),
}

/// Classify a raw [`WebSocket`] message into a [`FramePayload`], absorbing
/// protocol-level control frames.
///
/// Returns:
/// - `Some(Ok(payload))` for text and binary data frames,
/// - `Some(Err(TransportError::Terminated))` for close frames,
/// - `None` for pings, pongs and raw fragments (safe to skip).
pub fn classify_frame(
    input: Result<WsMessage, WsError>,
) -> Option<Result<FramePayload, TransportError>> {
    match input {
        Ok(WsMessage::Text(text)) => Some(Ok(FramePayload::Text(text.to_string()))),
        Ok(WsMessage::Binary(binary)) => Some(Ok(FramePayload::Binary(binary))),
        Ok(WsMessage::Ping(payload)) => {
            debug!(?payload, "received Ping WebSocket message");
            None
        }
        Ok(WsMessage::Pong(payload)) => {
            debug!(?payload, "received Pong WebSocket message");
            None
        }
        Ok(WsMessage::Close(close_frame)) => Some(Err(process_close_frame(close_frame))),
        Ok(WsMessage::Frame(frame)) => {
            debug!(payload = ?frame, "received unexpected Frame WebSocket message");
            None
        }
        Err(ws_err) => Some(Err(TransportError::WebSocket(Box::new(ws_err)))),
    }
}

/// Deserialise a text payload into a venue message.
pub fn decode_json<VenueMessage>(payload: &str) -> Result<VenueMessage, TransportError>
where
    VenueMessage: DeserializeOwned,
{
    serde_json::from_str::<VenueMessage>(payload).map_err(|error| {
        debug!(
            ?error,
            payload,
            "failed to deserialise WebSocket payload into venue message"
        );
        TransportError::DeserialiseJson {
            error,
            payload: payload.to_string(),
        }
    })
}

/// Deserialise a binary payload into a venue protobuf message.
///
/// Venues that multiplex protobuf data frames with JSON control messages
/// (eg/ MEXC) try this first and fall back to [`decode_json`] on failure.
pub fn decode_protobuf<VenueMessage>(payload: &[u8]) -> Result<VenueMessage, TransportError>
where
    VenueMessage: prost::Message + Default,
{
    VenueMessage::decode(payload).map_err(|error| TransportError::DeserialiseProtobuf {
        error,
        payload_len: payload.len(),
    })
}

fn process_close_frame(close_frame: Option<CloseFrame>) -> TransportError {
    let close_frame = format!("{close_frame:?}");
    debug!(payload = %close_frame, "received CloseFrame WebSocket message");
    TransportError::Terminated(close_frame)
}

/// Connect asynchronously to a [`WebSocket`] server.
pub async fn connect<R>(request: R) -> Result<WebSocket, TransportError>
where
    R: IntoClientRequest + Unpin + Debug,
{
    debug!(?request, "attempting to establish WebSocket connection");
    connect_async(request)
        .await
        .map(|(websocket, _)| websocket)
        .map_err(|error| TransportError::WebSocket(Box::new(error)))
}

/// Determine whether a [`WsError`] indicates the [`WebSocket`] has disconnected.
pub fn is_websocket_disconnected(error: &WsError) -> bool {
    matches!(
        error,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Io(_)
            | WsError::Protocol(ProtocolError::SendAfterClosing)
    )
}
