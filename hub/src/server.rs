//! # Websocket accept loop
//!
//! One task per accepted connection: upgrade the handshake, register with the subscription
//! registry, then loop reading client commands. `subscribe` validates the argument, replays
//! history up to the requested depth (capped by [`HistoryConfig::max_depth`]), and only then
//! registers the live subscription — so a push racing the replay can never land between two
//! replayed rows. `unsubscribe` drops the registry entry; `ping` answers with `pong`.

use crate::{
    query,
    router::{minute_of_day_from_unix, span_suffix, Handles},
};
use hub_core::{
    error::SubscriptionError,
    registry::ConnId,
    store::KeyValueStore,
    topic::{parse_arg, Detail, ParsedArg, Topic},
};
use hub_data::{
    kind::{Kind, OrderSuffix},
    market::Market,
};
use hub_integration::{
    error::SocketError,
    protocol::{ClientCommand, ConnectionHandle, WsConnection},
};
use rust_decimal::Decimal;
use std::{str::FromStr, sync::atomic::Ordering};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

/// Accepts connections on `listener` until `shutdown` fires, spawning one task per connection.
pub async fn serve<S: KeyValueStore + 'static>(
    listener: TcpListener,
    handles: Handles<S, ConnectionHandle>,
    mut shutdown: tokio::sync::watch::Receiver<()>,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("websocket accept loop shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (tcp, peer) = accepted?;
                let handles = handles.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(tcp, handles).await {
                        warn!(%peer, %err, "connection closed with error");
                    }
                });
            }
        }
    }
}

async fn handle_connection<S: KeyValueStore>(
    tcp: TcpStream,
    handles: Handles<S, ConnectionHandle>,
) -> Result<(), SocketError> {
    let mut conn = WsConnection::accept(tcp).await?;
    let id = handles.registry.add_conn(conn.handle.clone());

    loop {
        let Some(command) = conn.next_command().await? else {
            break;
        };
        if let Err(err) = dispatch(&mut conn, &handles, id, command).await {
            warn!(%err, "rejecting subscriber command");
            conn.handle.send("error", &err.to_string()).await.ok();
        }
    }

    if let Some(handle) = handles.registry.remove_conn(id) {
        handle.close().await;
    }
    Ok(())
}

async fn dispatch<S: KeyValueStore>(
    conn: &mut WsConnection,
    handles: &Handles<S, ConnectionHandle>,
    id: ConnId,
    command: ClientCommand,
) -> Result<(), SocketError> {
    match command.op.as_str() {
        "subscribe" => {
            for arg in &command.args {
                let parsed = parse_arg(arg).map_err(to_socket_error)?;
                replay_history(conn, handles, &parsed, command.depth).await?;
                handles.registry.subscribe(id, parsed).map_err(to_socket_error)?;
            }
            conn.handle.send("subscribed", &command.args).await
        }
        "unsubscribe" => {
            for arg in &command.args {
                let parsed = parse_arg(arg).map_err(to_socket_error)?;
                handles.registry.unsubscribe(id, parsed);
            }
            conn.handle.send("unsubscribed", &command.args).await
        }
        "ping" => conn.handle.send("pong", &()).await,
        other => Err(SocketError::MalformedCommand(format!("unknown op '{other}'"))),
    }
}

fn to_socket_error(err: SubscriptionError) -> SocketError {
    match err {
        SubscriptionError::UnknownTopic(topic) => SocketError::UnknownTopic(topic),
        SubscriptionError::BadArity { topic, expected, got } => {
            SocketError::BadParamArity { topic, expected, got }
        }
        SubscriptionError::BadQualifier { topic, qualifier } => {
            SocketError::BadParamValue { topic, value: qualifier }
        }
    }
}

/// Maps a persisted topic onto the kind its history is indexed under. `None` for topics with no
/// time-ordered history: `blockinfo`/`slash` are live-push-only (no reserved kind byte backs
/// them), `ticker`/`depth` are live aggregate snapshots rather than an event log, and `locked` is
/// accepted for protocol completeness but has no upstream event driving it at all.
fn topic_kind(topic: Topic) -> Option<Kind> {
    Some(match topic {
        Topic::Unbonding => Kind::Unbonding,
        Topic::Redelegation => Kind::Redelegation,
        Topic::Unlock => Kind::Unlock,
        Topic::Tx => Kind::Tx,
        Topic::Income => Kind::Income,
        Topic::Order => Kind::Order,
        Topic::Comment => Kind::Comment,
        Topic::BancorTrade => Kind::BancorTrade,
        Topic::Bancor => Kind::BancorInfo,
        Topic::Deal => Kind::Deal,
        Topic::Kline => Kind::Candlestick,
        Topic::BlockInfo | Topic::Slash | Topic::Ticker | Topic::Depth | Topic::Locked => {
            return None
        }
    })
}

async fn replay_history<S: KeyValueStore>(
    conn: &mut WsConnection,
    handles: &Handles<S, ConnectionHandle>,
    parsed: &ParsedArg,
    requested_depth: Option<usize>,
) -> Result<(), SocketError> {
    match parsed.topic {
        Topic::Depth => replay_depth(conn, handles, parsed).await,
        Topic::Ticker => replay_ticker(conn, handles, parsed).await,
        _ => replay_log(conn, handles, parsed, requested_depth).await,
    }
}

async fn replay_depth<S: KeyValueStore>(
    conn: &mut WsConnection,
    handles: &Handles<S, ConnectionHandle>,
    parsed: &ParsedArg,
) -> Result<(), SocketError> {
    let Some(market_str) = &parsed.param else { return Ok(()) };
    let Some(market) = Market::parse(market_str) else { return Ok(()) };
    let level = match &parsed.detail {
        Detail::Level(level) => level.as_str(),
        _ => "all",
    };

    let depth = handles.depth.read();
    let Some(book) = depth.get(&market) else { return Ok(()) };
    let (sell, buy) = if level == "all" {
        (book.sell.get_lowest(usize::MAX), book.buy.get_highest(usize::MAX))
    } else {
        let Ok(bucket) = Decimal::from_str(level) else { return Ok(()) };
        (book.sell.bucketed_snapshot(bucket), book.buy.bucketed_snapshot(bucket))
    };
    drop(depth);

    conn.handle
        .send("depth", &serde_json::json!({ "market": market.as_str(), "sell": sell, "buy": buy }))
        .await
}

async fn replay_ticker<S: KeyValueStore>(
    conn: &mut WsConnection,
    handles: &Handles<S, ConnectionHandle>,
    parsed: &ParsedArg,
) -> Result<(), SocketError> {
    let Some(market_str) = &parsed.param else { return Ok(()) };
    let Some(market) = Market::parse(market_str) else { return Ok(()) };

    let minute = minute_of_day_from_unix(handles.block_time.load(Ordering::Relaxed));
    let ticker = handles.ticker.read();
    let Some(mgr) = ticker.get(&market) else { return Ok(()) };
    let Some(snapshot) = mgr.get_ticker(&market, minute) else { return Ok(()) };
    drop(ticker);

    conn.handle.send("ticker", &snapshot).await
}

async fn replay_log<S: KeyValueStore>(
    conn: &mut WsConnection,
    handles: &Handles<S, ConnectionHandle>,
    parsed: &ParsedArg,
    requested_depth: Option<usize>,
) -> Result<(), SocketError> {
    let Some(kind) = topic_kind(parsed.topic) else { return Ok(()) };
    let Some(subject) = &parsed.param else { return Ok(()) };

    let count = requested_depth.unwrap_or(handles.history.default_depth);
    let rows = query::query(
        handles.store.as_ref(),
        kind,
        subject.as_bytes(),
        u64::MAX,
        u64::MAX,
        count,
        handles.history.max_depth,
    )
    .map_err(|err| SocketError::MalformedCommand(err.to_string()))?;

    let rows: Vec<_> = if let Detail::Span(span) = parsed.detail {
        let suffix = span_suffix(span);
        rows.into_iter().filter(|row| row.suffix == suffix).collect()
    } else {
        rows
    };

    // `rows` is already newest-first (the natural order of a reverse scan); replay preserves
    // that order rather than re-reversing it, matching the newest-first history contract every
    // other historical query in this hub makes.
    for row in rows {
        let frame_type = if parsed.topic == Topic::Order {
            match OrderSuffix::from_byte(row.suffix) {
                Some(suffix) => suffix.frame_type(),
                None => continue,
            }
        } else {
            parsed.topic.as_str()
        };
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&row.value) {
            conn.handle.send(frame_type, &value).await?;
        }
    }
    Ok(())
}
