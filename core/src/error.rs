//! # Error taxonomy
//!
//! Decode and subscription errors are recoverable and
//! logged by the call site; [`StoreError`] is kept distinct from [`HubError`] because a flush
//! failure is escalated to process exit while everything else in [`HubError`] is merely logged.

use hub_data::error::DataError;
use hub_integration::error::SocketError;
use thiserror::Error;

/// Aggregates every recoverable error the hub can encounter while processing one event or one
/// subscriber command. The router never propagates these upward; it logs and continues.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("decode error: {0}")]
    Data(#[from] DataError),

    #[error("failed to decode event payload as json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error("delivery error: {0}")]
    Delivery(#[from] SocketError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A malformed subscribe/unsubscribe command. The connection that sent it remains open; the
/// error is returned to the caller as a rejection frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("unknown topic '{0}'")]
    UnknownTopic(String),

    #[error("topic '{topic}' expects {expected} parameter(s), got {got}")]
    BadArity {
        topic: String,
        expected: &'static str,
        got: usize,
    },

    #[error("topic '{topic}' does not accept qualifier '{qualifier}'")]
    BadQualifier { topic: String, qualifier: String },
}

/// Key-value engine failures. A failed batch flush at commit is fatal: the process exits so an
/// orchestrator restarts it and the upstream transport replays from the last persisted offset.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key-value engine error: {0}")]
    Engine(String),

    #[error("subject exceeds the codec's 255-byte bound: {0}")]
    Data(#[from] DataError),
}
