use super::WebSocketConfig;
use crate::{
    buffer::ObservationTx,
    error::ErrorCode,
    exchange::{WsAdapter, WsEvent},
    observation::{ObservationError, PriceObservation, ProviderEvent},
    registry::{ProviderAssignment, Registry},
};
use bytes::Bytes;
use chrono::Utc;
use fnv::FnvHashMap;
use futures::{SinkExt, StreamExt};
use lodestone_integration::{
    error::TransportError,
    protocol::websocket::{WsMessage, WsSink, WsStream, classify_frame, connect},
};
use rand::Rng;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Hard ceiling on the exponential reconnect back-off.
const BACKOFF_CEILING: Duration = Duration::from_secs(60);

/// Stream-based provider runtime.
///
/// Shards its assigned tickers across connections capped at
/// `max_subscriptions_per_connection`, opening at most `max_queries`
/// connections; tickers beyond that capacity are refused with
/// `SubscribeFailed`. Each shard runs an independent session state machine:
/// `Disconnected -> Dialing -> Connected -> Subscribing -> Live -> Draining`.
#[derive(Debug)]
pub struct WsProvider {
    config: WebSocketConfig,
    adapter: Arc<dyn WsAdapter>,
    registry: Arc<Registry>,
    tx: ObservationTx,
}

impl WsProvider {
    pub fn new(
        config: WebSocketConfig,
        adapter: Arc<dyn WsAdapter>,
        registry: Arc<Registry>,
        tx: ObservationTx,
    ) -> Self {
        Self {
            config,
            adapter,
            registry,
            tx,
        }
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let assignments = self.registry.tickers_for(&self.config.name);
        if assignments.is_empty() {
            debug!(provider = %self.config.name, "no assigned tickers, runtime idle");
            return;
        }

        let capacity = self.config.max_subscriptions_per_connection * self.config.max_queries;
        if assignments.len() > capacity {
            for refused in &assignments[capacity..] {
                self.tx.push(ProviderEvent::Error(ObservationError {
                    provider: self.config.name.clone(),
                    pair: refused.pair.clone(),
                    code: ErrorCode::SubscribeFailed,
                    detail: format!("subscription capacity {capacity} exhausted"),
                }));
            }
            warn!(
                provider = %self.config.name,
                refused = assignments.len() - capacity,
                capacity,
                "refusing tickers beyond subscription capacity"
            );
        }

        let capped = assignments
            .into_iter()
            .take(capacity)
            .collect::<Vec<_>>();
        let sessions = capped
            .chunks(self.config.max_subscriptions_per_connection)
            .map(|shard| {
                WsSession::new(
                    self.config.clone(),
                    Arc::clone(&self.adapter),
                    self.tx.clone(),
                    shard.to_vec(),
                )
                .run(shutdown.clone())
            })
            .collect::<Vec<_>>();

        futures::future::join_all(sessions).await;
    }
}

/// Terminal outcome of one connection attempt.
enum SessionExit {
    /// The engine requested shutdown.
    Shutdown,
    /// The dial or upgrade failed before the session went live.
    DialFailed(String),
    /// A live session lost its connection.
    ConnectionLost(String),
}

/// One connection's slice of the provider's tickers.
struct WsSession {
    config: WebSocketConfig,
    adapter: Arc<dyn WsAdapter>,
    tx: ObservationTx,
    shard: Vec<ProviderAssignment>,
    // Venue symbol -> assignment index, for resolving inbound events.
    symbol_index: FnvHashMap<String, usize>,
}

impl WsSession {
    fn new(
        config: WebSocketConfig,
        adapter: Arc<dyn WsAdapter>,
        tx: ObservationTx,
        shard: Vec<ProviderAssignment>,
    ) -> Self {
        let symbol_index = shard
            .iter()
            .enumerate()
            .map(|(index, assignment)| (assignment.off_chain_ticker.to_uppercase(), index))
            .collect();
        Self {
            config,
            adapter,
            tx,
            shard,
            symbol_index,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = ReconnectBackoff::new(self.config.reconnection_timeout());
        let mut endpoint_cursor = 0usize;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let endpoint =
                self.config.endpoints[endpoint_cursor % self.config.endpoints.len()].clone();

            match self.connect_and_stream(&endpoint.url, &mut shutdown).await {
                SessionExit::Shutdown => break,
                SessionExit::DialFailed(reason) => {
                    warn!(
                        provider = %self.config.name,
                        endpoint = %endpoint.url,
                        reason,
                        "failed to establish WebSocket session"
                    );
                }
                SessionExit::ConnectionLost(reason) => {
                    warn!(
                        provider = %self.config.name,
                        endpoint = %endpoint.url,
                        reason,
                        "live WebSocket session lost"
                    );
                    self.record_connection_lost(&reason);
                    // A session that went live earns a fresh back-off ramp.
                    backoff.reset();
                }
            }

            // Failover in declared order, round-robin on repeated failure.
            endpoint_cursor += 1;

            let delay = backoff.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn connect_and_stream(
        &self,
        url: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionExit {
        // Dialing
        let websocket =
            match tokio::time::timeout(self.config.handshake_timeout(), connect(url)).await {
                Err(_) => return SessionExit::DialFailed("handshake timed out".to_string()),
                Ok(Err(error)) => return SessionExit::DialFailed(error.to_string()),
                Ok(Ok(websocket)) => websocket,
            };

        // Connected: quiet period before the first subscribe.
        tokio::select! {
            _ = tokio::time::sleep(self.config.post_connection_timeout()) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return SessionExit::Shutdown;
                }
            }
        }

        let (mut sink, mut stream) = websocket.split();

        // Subscribing
        if let Err(exit) = self.subscribe(&mut sink).await {
            return exit;
        }
        info!(
            provider = %self.config.name,
            subscriptions = self.shard.len(),
            url,
            "WebSocket session live"
        );

        // Live
        let exit = self.live(&mut sink, &mut stream, shutdown).await;

        // Draining: best-effort close frame, then surface the exit.
        let _ = sink.send(WsMessage::Close(None)).await;
        exit
    }

    async fn subscribe(&self, sink: &mut WsSink) -> Result<(), SessionExit> {
        let mut write_pacer = tokio::time::interval(self.config.write_interval());

        for batch in self.shard.chunks(self.config.max_subscriptions_per_batch) {
            let messages = match self.adapter.subscribe_messages(batch) {
                Ok(messages) => messages,
                Err(error) => {
                    // The batch is unusable, but other batches may subscribe.
                    for assignment in batch {
                        self.tx.push(ProviderEvent::Error(ObservationError {
                            provider: self.config.name.clone(),
                            pair: assignment.pair.clone(),
                            code: ErrorCode::SubscribeFailed,
                            detail: error.to_string(),
                        }));
                    }
                    continue;
                }
            };

            for message in messages {
                write_pacer.tick().await;
                let send = tokio::time::timeout(self.config.write_timeout(), sink.send(message));
                match send.await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => {
                        return Err(SessionExit::ConnectionLost(format!(
                            "subscribe write failed: {error}"
                        )));
                    }
                    Err(_) => {
                        return Err(SessionExit::ConnectionLost(
                            "subscribe write timed out".to_string(),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    async fn live(
        &self,
        sink: &mut WsSink,
        stream: &mut WsStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionExit {
        let mut ping = tokio::time::interval(self.config.ping_interval());
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick completes immediately; skip it so the
        // heartbeat cadence starts one period after going live.
        ping.tick().await;

        let mut consecutive_read_errors = 0usize;
        let mut acknowledged = 0usize;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return SessionExit::Shutdown;
                    }
                }
                _ = ping.tick() => {
                    let frame = self
                        .adapter
                        .heartbeat()
                        .unwrap_or_else(|| WsMessage::Ping(Bytes::new()));
                    let send = tokio::time::timeout(self.config.write_timeout(), sink.send(frame));
                    match send.await {
                        Ok(Ok(())) => {}
                        Ok(Err(error)) => {
                            return SessionExit::ConnectionLost(format!(
                                "heartbeat write failed: {error}"
                            ));
                        }
                        Err(_) => {
                            return SessionExit::ConnectionLost(
                                "heartbeat write timed out".to_string(),
                            );
                        }
                    }
                }
                read = tokio::time::timeout(self.config.read_timeout(), stream.next()) => {
                    match read {
                        Err(_) => {
                            consecutive_read_errors += 1;
                            if consecutive_read_errors >= self.config.max_read_error_count {
                                return SessionExit::ConnectionLost(
                                    "consecutive read timeouts".to_string(),
                                );
                            }
                        }
                        Ok(None) => {
                            return SessionExit::ConnectionLost("stream ended".to_string());
                        }
                        Ok(Some(frame)) => match classify_frame(frame) {
                            // Control frame: the connection is healthy.
                            None => consecutive_read_errors = 0,
                            Some(Err(TransportError::Terminated(reason))) => {
                                return SessionExit::ConnectionLost(reason);
                            }
                            Some(Err(error)) => {
                                consecutive_read_errors += 1;
                                debug!(
                                    provider = %self.config.name,
                                    %error,
                                    consecutive_read_errors,
                                    "WebSocket read error"
                                );
                                if consecutive_read_errors >= self.config.max_read_error_count {
                                    return SessionExit::ConnectionLost(error.to_string());
                                }
                            }
                            Some(Ok(payload)) => match self.adapter.handle_frame(payload) {
                                Ok(events) => {
                                    consecutive_read_errors = 0;
                                    self.apply_events(events, &mut acknowledged);
                                }
                                Err(error) => {
                                    consecutive_read_errors += 1;
                                    debug!(
                                        provider = %self.config.name,
                                        %error,
                                        consecutive_read_errors,
                                        "failed to handle WebSocket frame"
                                    );
                                    if consecutive_read_errors >= self.config.max_read_error_count {
                                        return SessionExit::ConnectionLost(error.to_string());
                                    }
                                }
                            },
                        },
                    }
                }
            }
        }
    }

    fn apply_events(&self, events: Vec<WsEvent>, acknowledged: &mut usize) {
        let observed_at = Utc::now();

        for event in events {
            match event {
                WsEvent::Price {
                    off_chain_ticker,
                    price,
                } => match self.resolve(&off_chain_ticker) {
                    Some(assignment) => self.tx.push(ProviderEvent::Price(PriceObservation {
                        provider: self.config.name.clone(),
                        pair: assignment.pair.clone(),
                        price,
                        observed_at,
                    })),
                    None => debug!(
                        provider = %self.config.name,
                        off_chain_ticker,
                        "price update for unassigned venue symbol"
                    ),
                },
                WsEvent::PriceError {
                    off_chain_ticker,
                    code,
                    detail,
                } => {
                    if let Some(assignment) = self.resolve(&off_chain_ticker) {
                        self.tx.push(ProviderEvent::Error(ObservationError {
                            provider: self.config.name.clone(),
                            pair: assignment.pair.clone(),
                            code,
                            detail,
                        }));
                    }
                }
                WsEvent::SubscriptionAck { detail } => {
                    *acknowledged += 1;
                    debug!(
                        provider = %self.config.name,
                        acknowledged = *acknowledged,
                        expected = self.shard.len(),
                        detail,
                        "venue acknowledged subscription"
                    );
                }
                WsEvent::Pong => {
                    debug!(provider = %self.config.name, "venue answered heartbeat");
                }
            }
        }
    }

    fn resolve(&self, off_chain_ticker: &str) -> Option<&ProviderAssignment> {
        self.symbol_index
            .get(&off_chain_ticker.to_uppercase())
            .map(|index| &self.shard[*index])
    }

    fn record_connection_lost(&self, reason: &str) {
        for assignment in &self.shard {
            self.tx.push(ProviderEvent::Error(ObservationError {
                provider: self.config.name.clone(),
                pair: assignment.pair.clone(),
                code: ErrorCode::ConnectionLost,
                detail: reason.to_string(),
            }));
        }
    }
}

/// Exponential reconnect back-off with jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReconnectBackoff {
    initial: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    fn new(initial: Duration) -> Self {
        Self {
            initial,
            current: initial,
        }
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Current delay plus up to 25% jitter; doubles the base for next time,
    /// capped at [`BACKOFF_CEILING`].
    fn next_delay(&mut self) -> Duration {
        let base = self.current;
        let jitter_cap = (base.as_millis() as u64 / 4).max(1);
        let jitter = Duration::from_millis(rand::rng().random_range(0..jitter_cap));

        self.current = (base * 2).min(BACKOFF_CEILING.max(self.initial));

        base + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(10));

        let first = backoff.next_delay();
        assert!(first >= Duration::from_secs(10));
        assert!(first < Duration::from_secs(13));

        let second = backoff.next_delay();
        assert!(second >= Duration::from_secs(20));

        for _ in 0..8 {
            backoff.next_delay();
        }
        assert!(backoff.current <= BACKOFF_CEILING);

        backoff.reset();
        assert_eq!(backoff.current, Duration::from_secs(10));
    }
}
