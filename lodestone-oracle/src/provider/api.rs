use super::ApiConfig;
use crate::{
    buffer::ObservationTx,
    error::{ErrorCode, OracleError},
    exchange::ApiAdapter,
    observation::{ObservationError, PriceObservation, ProviderEvent},
    registry::{ProviderAssignment, Registry},
};
use chrono::Utc;
use futures::{StreamExt, stream};
use lodestone_integration::protocol::http::RestClient;
use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Poll-based provider runtime.
///
/// Each tick bins the assigned tickers by the adapter's `max_ids_per_query`,
/// issues bins concurrently up to `max_queries`, and publishes one event per
/// assigned ticker: a price observation, a venue-reported failure, or
/// `MissingPrice` when the response simply omitted the ticker. A bin's
/// failure is isolated to that bin's tickers.
#[derive(Debug)]
pub struct ApiPoller {
    config: ApiConfig,
    adapter: Arc<dyn ApiAdapter>,
    registry: Arc<Registry>,
    tx: ObservationTx,
    client: RestClient,
    // Round-robin failover across declared endpoints.
    endpoint_cursor: AtomicUsize,
}

impl ApiPoller {
    pub fn new(
        config: ApiConfig,
        adapter: Arc<dyn ApiAdapter>,
        registry: Arc<Registry>,
        tx: ObservationTx,
    ) -> Result<Self, OracleError> {
        let client = RestClient::new(config.timeout(), config.max_queries)?;
        Ok(Self {
            config,
            adapter,
            registry,
            tx,
            client,
            endpoint_cursor: AtomicUsize::new(0),
        })
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(provider = %self.config.name, "api poller shutting down");
                        break;
                    }
                }
                _ = interval.tick() => self.poll().await,
            }
        }
    }

    async fn poll(&self) {
        let assignments = self.registry.tickers_for(&self.config.name);
        if assignments.is_empty() {
            return;
        }

        let bins = assignments
            .chunks(self.adapter.max_ids_per_query().max(1))
            .map(<[ProviderAssignment]>::to_vec)
            .collect::<Vec<_>>();

        stream::iter(bins)
            .map(|bin| self.query_bin(bin))
            .buffer_unordered(self.config.max_queries)
            .collect::<Vec<()>>()
            .await;
    }

    async fn query_bin(&self, bin: Vec<ProviderAssignment>) {
        let endpoint_count = self.config.endpoints.len();
        let cursor = self.endpoint_cursor.load(Ordering::Relaxed) % endpoint_count;
        let endpoint = &self.config.endpoints[cursor];

        let url = match self.adapter.create_url(endpoint, &bin) {
            Ok(url) => url,
            Err(error) => {
                self.record_bin_failure(&bin, ErrorCode::from(&error), error.to_string());
                return;
            }
        };

        let (status, body, latency) = match self.client.get(url, self.config.timeout()).await {
            Ok(response) => response,
            Err(error) => {
                // Try the next declared endpoint on the following request.
                self.endpoint_cursor
                    .store((cursor + 1) % endpoint_count, Ordering::Relaxed);
                self.record_bin_failure(&bin, ErrorCode::from(&error), error.to_string());
                return;
            }
        };
        debug!(provider = %self.config.name, metric = ?latency, "completed venue request");

        let parsed = self.adapter.parse(&bin, status, &body);
        let observed_at = Utc::now();

        let mut seen = HashSet::with_capacity(bin.len());
        for (pair, price) in parsed.resolved {
            seen.insert(pair.clone());
            self.tx.push(ProviderEvent::Price(PriceObservation {
                provider: self.config.name.clone(),
                pair,
                price,
                observed_at,
            }));
        }
        for (pair, code, detail) in parsed.unresolved {
            seen.insert(pair.clone());
            self.tx.push(ProviderEvent::Error(ObservationError {
                provider: self.config.name.clone(),
                pair,
                code,
                detail,
            }));
        }

        // Anything requested but absent from the response is a missing price.
        for assignment in &bin {
            if !seen.contains(&assignment.pair) {
                self.tx.push(ProviderEvent::Error(ObservationError {
                    provider: self.config.name.clone(),
                    pair: assignment.pair.clone(),
                    code: ErrorCode::MissingPrice,
                    detail: format!(
                        "venue response omitted {}",
                        assignment.off_chain_ticker
                    ),
                }));
            }
        }
    }

    fn record_bin_failure(&self, bin: &[ProviderAssignment], code: ErrorCode, detail: String) {
        warn!(provider = %self.config.name, %code, detail, "venue request failed");
        for assignment in bin {
            self.tx.push(ProviderEvent::Error(ObservationError {
                provider: self.config.name.clone(),
                pair: assignment.pair.clone(),
                code,
                detail: detail.clone(),
            }));
        }
    }
}
