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

//! # hub-data — domain model and in-memory aggregates
//!
//! Owns the pieces of the indexing hub that have no opinion about concurrency or I/O:
//!
//! - [`codec`]: the time-ordered composite key encoding every indexed kind shares.
//! - [`kind`]: the closed enumeration of persisted kinds and upstream event kinds.
//! - [`market`]: the `STOCK/MONEY` trading-pair identifier and order side.
//! - [`depth`], [`ticker`], [`candle`]: the three in-memory aggregate managers.
//! - [`event`]: typed views over upstream payload JSON used to drive dispatch.
//!
//! `hub-core` owns locking, persistence and subscriber fan-out around these types.

/// Errors produced while decoding or indexing a single event.
pub mod error;

/// Time-ordered composite key encoding.
pub mod codec;

/// Persisted kind bytes and the closed upstream event kind enumeration.
pub mod kind;

/// The `STOCK/MONEY` trading pair identifier and order side.
pub mod market;

/// Per-(market, side) order-book depth aggregation.
pub mod depth;

/// Per-market 24h ticker aggregation.
pub mod ticker;

/// Per-market candlestick aggregation.
pub mod candle;

/// Typed views over upstream event payloads.
pub mod event;
