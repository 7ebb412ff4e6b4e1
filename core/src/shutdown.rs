//! # Shutdown management
//!
//! The intake loop exits when the upstream transport signals end-of-stream; the websocket
//! accept loop exits on the same signal, broadcast through a [`Shutdown`] watch so in-flight
//! pushes are allowed to complete and the final batch is flushed before the process returns.

use serde::{Deserialize, Serialize};

/// A shutdown signal broadcast to every long-running task (intake loop, accept loop).
///
/// ## Usage
/// ```rust,ignore
/// use hub_core::shutdown::Shutdown;
/// use tokio::sync::watch;
///
/// let (tx, rx) = watch::channel(());
/// // ... pass `rx` to the intake loop and the accept loop ...
/// tx.send(()).ok(); // broadcast Shutdown on ctrl_c or end-of-stream
/// let _ = Shutdown;
/// ```
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize,
)]
pub struct Shutdown;
