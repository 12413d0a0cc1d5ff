use crate::{
    aggregator::Aggregator,
    buffer::{DEFAULT_BUFFER_CAPACITY, ObservationTx, observation_channel},
    config::OracleConfig,
    error::OracleError,
    marketmap::{Resolver, ResolverHealth},
    provider::{ProviderHandle, spawn_provider},
    registry::Registry,
    rpc::{self, RpcContext},
    state::PriceState,
};
use std::{collections::HashMap, future::Future, sync::Arc};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Wires the whole side-car together and supervises its long-lived tasks:
/// one per provider runtime, one market-map resolver, one aggregator, one
/// RPC server.
///
/// Provider runtimes are restarted whenever a market-map install changes
/// their assignments; a single provider's failure never cancels its peers.
/// Shutdown tears down in reverse dependency order: Query Surface ->
/// Aggregator -> Providers -> Registry -> Resolver.
#[derive(Debug)]
pub struct Engine {
    config: OracleConfig,
}

impl Engine {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub async fn run<Signal>(self, shutdown_signal: Signal) -> Result<(), OracleError>
    where
        Signal: Future<Output = ()>,
    {
        let rpc_listen_address = self.config.rpc_listen_address()?;

        let registry = Arc::new(Registry::new());
        let state = Arc::new(PriceState::new());
        let health = Arc::new(ResolverHealth::default());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (epoch_tx, mut epoch_rx) = watch::channel(0u64);

        // One observation ring per configured provider; the rings outlive
        // provider restarts so no observation is lost across an install.
        let mut observation_txs: HashMap<String, ObservationTx> = HashMap::new();
        let mut observation_rxs = Vec::new();
        for spec in &self.config.providers {
            let (tx, rx) = observation_channel(DEFAULT_BUFFER_CAPACITY);
            observation_txs.insert(spec.name.clone(), tx);
            observation_rxs.push(rx);
        }

        // Resolver: perform the initial install before anything subscribes.
        let resolver = Resolver::new(
            self.config.market_map.clone(),
            Arc::clone(&registry),
            Arc::clone(&health),
            epoch_tx,
        )?;
        resolver.resolve_once().await;
        if !health.is_healthy() {
            warn!(
                error = ?health.last_error(),
                "initial market map install failed, serving empty map until a fetch succeeds"
            );
        }
        let resolver_task = tokio::spawn(resolver.run(shutdown_rx.clone()));

        // Providers, assigned their slice of the installed map.
        let mut providers = self.spawn_providers(&registry, &observation_txs, &shutdown_rx);

        // Aggregator.
        let aggregator = Aggregator::new(
            Arc::clone(&registry),
            Arc::clone(&state),
            observation_rxs,
            self.config.aggregation_interval(),
            self.config.observation_staleness(),
        );
        let aggregator_task = tokio::spawn(aggregator.run(shutdown_rx.clone()));

        // Query surface.
        let rpc_context = RpcContext {
            registry: Arc::clone(&registry),
            state: Arc::clone(&state),
            health: Arc::clone(&health),
            max_price_age: self.config.max_price_age(),
        };
        let rpc_task = tokio::spawn(rpc::serve(
            rpc_listen_address,
            rpc_context,
            shutdown_rx.clone(),
        ));

        info!(providers = providers.len(), "oracle engine running");

        // Supervise: restart providers on market-map changes until shutdown.
        tokio::pin!(shutdown_signal);
        loop {
            tokio::select! {
                _ = &mut shutdown_signal => {
                    info!("shutdown signal received");
                    break;
                }
                changed = epoch_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    info!(epoch = *epoch_rx.borrow(), "market map changed, restarting providers");
                    for provider in &providers {
                        provider.abort();
                    }
                    providers = self.spawn_providers(&registry, &observation_txs, &shutdown_rx);
                }
            }
        }

        // Reverse-dependency teardown.
        let _ = shutdown_tx.send(true);
        match rpc_task.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => error!(%error, "rpc server exited with error"),
            Err(join_error) => error!(%join_error, "rpc server task panicked"),
        }
        let _ = aggregator_task.await;
        for provider in providers {
            let _ = provider.join.await;
        }
        let _ = resolver_task.await;

        info!("oracle engine stopped");
        Ok(())
    }

    fn spawn_providers(
        &self,
        registry: &Arc<Registry>,
        observation_txs: &HashMap<String, ObservationTx>,
        shutdown_rx: &watch::Receiver<bool>,
    ) -> Vec<ProviderHandle> {
        self.config
            .providers
            .iter()
            .filter_map(|spec| {
                let tx = observation_txs
                    .get(&spec.name)
                    .expect("every configured provider has an observation ring")
                    .clone();
                match spawn_provider(spec, Arc::clone(registry), tx, shutdown_rx.clone()) {
                    Ok(handle) => handle,
                    Err(error) => {
                        // Config errors were caught at startup; anything here
                        // is scoped to this provider.
                        error!(provider = %spec.name, %error, "failed to spawn provider");
                        None
                    }
                }
            })
            .collect()
    }
}
