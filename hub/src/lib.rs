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

//! # hub — market-data indexing and websocket fan-out
//!
//! Wires `hub-core`'s persistence/registry/delivery primitives and `hub-data`'s aggregate
//! managers into the three pieces that are specific to this domain:
//!
//! - [`transport`]: the upstream message delivery contract, plus a file-tail implementation and
//!   an in-memory test double.
//! - [`router`]: the event router — the single task that owns every aggregate manager and
//!   dispatches one decoded upstream event at a time.
//! - [`commit`]: the per-block commit cycle — ticker/depth pushes, then a durable batch flush.
//! - [`query`]: bounded historical reverse-scan queries, shared by the router's own
//!   delegation-completion lookup and the server's subscribe-time replay.
//! - [`server`]: the websocket accept loop.

/// Upstream message delivery contract, file-tail implementation, and in-memory test double.
pub mod transport;

/// The event router: owns every aggregate manager, dispatches decoded upstream events.
pub mod router;

/// Per-block commit cycle: ticker/depth pushes, then a durable batch flush.
pub mod commit;

/// Bounded historical reverse-scan queries.
pub mod query;

/// Websocket accept loop and subscriber command handling.
pub mod server;

use router::Hub;
use std::time::Duration;
use tokio::sync::watch;
use transport::Transport;
use tracing::error;

/// Drives `transport` into `hub` until `shutdown` fires. A transport that currently has nothing
/// new (`Ok(None)`) is polled again after a short delay rather than treated as a hard stop, since
/// a tailed source can always receive more data later; only the shutdown signal ends the loop.
/// Flushes any batch left open by the last (uncommitted) block before returning.
pub async fn run_intake<S, H, T>(
    hub: &mut Hub<S, H>,
    transport: &mut T,
    start_offset: i64,
    mut shutdown: watch::Receiver<()>,
) -> Result<(), hub_core::error::StoreError>
where
    S: hub_core::store::KeyValueStore,
    H: hub_core::delivery::Pushable,
    T: Transport,
{
    if let Err(err) = transport.seek(start_offset).await {
        error!(%err, "failed to seek upstream transport to the resume offset");
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            polled = transport.next() => match polled {
                Ok(Some(event)) => {
                    hub.note_offset(event.offset);
                    hub.consume(&event.kind, &event.payload).await;
                }
                Ok(None) => tokio::time::sleep(Duration::from_millis(200)).await,
                Err(err) => {
                    error!(%err, "upstream transport error, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            },
        }
    }

    if !hub.batch_is_empty() {
        commit::run(hub).await?;
    }
    Ok(())
}
