#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # hub-core — persistence, subscription registry and fan-out delivery
//!
//! Owns every concurrency- and I/O-facing seam the indexing hub needs, generic over the domain
//! types `hub-data` defines:
//!
//! - [`store`]: the ordered byte-key/byte-value contract the router's batch and every historical
//!   query are built against, plus a `rocksdb`-backed and an in-memory implementation.
//! - [`topic`]: the closed subscriber-topic enumeration, parameter validation, and the
//!   polymorphic per-subscription "detail".
//! - [`registry`]: the thread-safe topic⇄connection subscription graph.
//! - [`delivery`]: fan-out push, evicting a connection on write failure.
//! - [`config`]: the typed startup configuration shape.
//! - [`logging`]: `tracing` initializers.
//! - [`error`]: the aggregating error taxonomy.
//! - [`shutdown`]: the graceful-shutdown signal.
//!
//! `hub` (the binary crate) wires these together into the event router and commit cycle.

/// Error taxonomy aggregating decode, subscription, delivery and store failures.
pub mod error;

/// Declarative startup configuration (`HubConfig`).
pub mod config;

/// `tracing`/`tracing-subscriber` initializers.
pub mod logging;

/// The ordered key-value store contract, plus `rocksdb` and in-memory implementations.
pub mod store;

/// Closed subscriber-topic enumeration and parameter validation.
pub mod topic;

/// Thread-safe topic⇄connection subscription graph.
pub mod registry;

/// Fan-out delivery: serialise once, push to every matching subscriber, evict on failure.
pub mod delivery;

/// Graceful-shutdown signal.
pub mod shutdown;
