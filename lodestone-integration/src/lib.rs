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

//! # Lodestone-Integration
//! Low-level transport plumbing for composing market data venue integrations.
//!
//! Utilised by the Lodestone oracle side-car to talk to centralised exchange
//! REST APIs, exchange WebSockets and aggregator APIs behind one failure
//! discipline. It is:
//! * **Protocol-agnostic upstream**: venue adapters only see decoded frames and
//!   parsed HTTP payloads, never raw sockets.
//! * **Deadline-complete**: every outbound request and read carries an explicit
//!   timeout; a missing deadline is a configuration error at a higher layer.

use crate::error::TransportError;

/// All [`Error`](std::error::Error)s generated in Lodestone-Integration.
pub mod error;

/// WebSocket and public REST protocol implementations used to communicate with
/// market data venues.
pub mod protocol;

/// Flat `Metric` type used to report transport-level measurements generically.
pub mod metric;

/// Utilities to assist deserialisation of venue payloads.
pub mod de;

/// [`Validator`]s are capable of determining if their internal state is
/// satisfactory to fulfill some use case defined by the implementor.
///
/// Used by venue subscription responses to communicate whether a subscription
/// was accepted, and by configuration records to self-check at startup.
pub trait Validator {
    /// Check if `Self` is valid for some use case.
    fn validate(self) -> Result<Self, TransportError>
    where
        Self: Sized;
}
