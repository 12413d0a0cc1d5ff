#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # Lodestone-Oracle
//! Multi-provider price aggregation engine - the core of an oracle side-car
//! that continuously aggregates price observations from heterogeneous market
//! data venues and exposes one consistent price per currency pair to a
//! consensus-driven chain via a local RPC endpoint.
//!
//! ## Architecture
//! Market-Map Resolver -> [`Registry`](registry::Registry) (installs tickers)
//! -> Provider Runtimes (poll / stream venues, push observations into
//! per-provider ring buffers) -> [`Aggregator`](aggregator::Aggregator)
//! (deterministic per-tick median with conversion-path resolution) ->
//! [`PriceState`](state::PriceState) snapshot -> local `Prices` RPC.
//!
//! Each provider runtime is an independent tokio task; a single provider's
//! failure never cancels its peers. Shared state (the installed market map
//! and the aggregated price snapshot) is replaced by atomic `Arc` swap, so
//! readers are never blocked across I/O.

/// Deterministic per-tick price reduction: staleness filtering, provider
/// transforms (invert / normalize-by-pair in topological order) and the
/// provider-count-gated median.
pub mod aggregator;

/// Bounded single-producer single-consumer ring buffers carrying provider
/// events from runtimes to the aggregator.
pub mod buffer;

/// Oracle configuration document: document-level cadences, market-map source
/// selection and per-provider runtime options.
pub mod config;

/// Engine wiring: task startup, market-map driven provider restarts and
/// reverse-dependency shutdown.
pub mod engine;

/// All [`Error`](std::error::Error)s generated in Lodestone-Oracle, including
/// the observation [`ErrorCode`](error::ErrorCode) taxonomy.
pub mod error;

/// Venue adapter implementations and the capability traits they satisfy.
pub mod exchange;

/// The market data model: currency pairs, tickers, provider configs, markets
/// and the validated [`MarketMap`](market::MarketMap).
pub mod market;

/// Composition of authoritative market-map sources (local node, external
/// mainnet, research overlay) into one installed map.
pub mod marketmap;

/// Opaque ticker metadata carried through the market map.
pub mod metadata;

/// Price observations produced by providers and the aggregated prices
/// published per tick.
pub mod observation;

/// Provider runtimes: the REST poller and the WebSocket session harness.
pub mod provider;

/// Process-wide provider ticker registry installed from the market map.
pub mod registry;

/// Local `Prices` RPC surface.
pub mod rpc;

/// Most-recent aggregated price snapshot shared between the aggregator and
/// the RPC surface.
pub mod state;
