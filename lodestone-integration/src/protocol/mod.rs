/// Public REST client with per-request deadlines and latency measurement.
pub mod http;

/// WebSocket connection, frame classification and payload decoding utilities.
pub mod websocket;
