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

//! # hub-integration — low-level websocket plumbing
//!
//! Speaks the hub's subscriber-facing websocket protocol: accepting connections, parsing
//! client commands (`subscribe`/`unsubscribe`/`ping`), and writing typed JSON frames out.
//! The hub crate owns all domain semantics; this crate only owns the wire.

/// All [`Error`](std::error::Error)s generated in Integration.
pub mod error;

/// Server-side websocket framing: accept, read client commands, write typed frames.
pub mod protocol;
