//! End-to-end scenarios driving a full `Hub` through the upstream event surface: order
//! lifecycle and indexing, delegation-completion fan-out, depth level bucketing, websocket
//! subscribe/replay/live-push over a real socket, and crash-before-flush recovery.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use hub::{commit, query, router::Hub, server};
use hub_core::{
    config::HistoryConfig,
    delivery::Pushable,
    registry::SubscriptionRegistry,
    store::MemoryStore,
    topic::parse_arg,
};
use hub_data::{candle::Span, event::*, kind::Kind, market::Market};
use hub_integration::{error::SocketError, protocol::ConnectionHandle};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Parses a JSON-encoded decimal field (rust_decimal serialises as a string) back into a
/// `Decimal` so assertions compare by value rather than by exact scale/string representation.
fn dec_field(value: &serde_json::Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

/// A `Pushable` test double recording every frame it receives, bypassing the real socket.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn frames(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pushable for Recorder {
    async fn push_text(&self, frame: Arc<str>) -> Result<(), SocketError> {
        self.0.lock().unwrap().push(frame.to_string());
        Ok(())
    }
    async fn close(&self) {}
}

fn payload<T: serde::Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}

/// S1 — a create/fill/cancel order lifecycle persists all three events under the same subject,
/// indexes the resulting deal, and updates the in-progress candlestick.
#[tokio::test]
async fn order_lifecycle_persists_and_indexes() {
    let store = Arc::new(MemoryStore::new());
    let registry: Arc<SubscriptionRegistry<Recorder>> = Arc::new(SubscriptionRegistry::new());
    let (mut hub, _offset) =
        Hub::resume(store.clone(), registry, HistoryConfig::default(), 0).unwrap();

    hub.consume("height_info", &payload(&HeightInfo { height: 1, time: 1_000 })).await;
    hub.consume(
        "create_order_info",
        &payload(&CreateOrderInfo {
            sender: "alice".into(),
            order_id: "alice-1".into(),
            stock: "BTC".into(),
            money: "USD".into(),
            side: OrderSide::Sell,
            price: dec!(100),
            quantity: dec!(5),
        }),
    )
    .await;
    hub.consume(
        "fill_order_info",
        &payload(&FillOrderInfo {
            order_id: "alice-1".into(),
            stock: "BTC".into(),
            money: "USD".into(),
            side: OrderSide::Sell,
            deal_money: dec!(300),
            deal_stock: dec!(3),
        }),
    )
    .await;
    hub.consume(
        "del_order_info",
        &payload(&DelOrderInfo {
            order_id: "alice-1".into(),
            stock: "BTC".into(),
            money: "USD".into(),
            side: OrderSide::Sell,
            price: dec!(100),
            left_stock: dec!(2),
        }),
    )
    .await;
    hub.consume("commit", &[]).await;

    let orders = query::query(store.as_ref(), Kind::Order, b"alice", u64::MAX, u64::MAX, 10, 1024).unwrap();
    assert_eq!(orders.len(), 3);
    // Newest first: cancel, fill, create.
    assert_eq!(orders[0].suffix, 3);
    assert_eq!(orders[1].suffix, 2);
    assert_eq!(orders[2].suffix, 1);

    let deals = query::query(store.as_ref(), Kind::Deal, b"BTC/USD", u64::MAX, u64::MAX, 10, 1024).unwrap();
    assert_eq!(deals.len(), 1);
    let deal: serde_json::Value = serde_json::from_slice(&deals[0].value).unwrap();
    assert_eq!(deal["account"], "alice");
    assert_eq!(dec_field(&deal["price"]), dec!(100));
    assert_eq!(dec_field(&deal["volume"]), dec!(3));

    let market = Market::parse("BTC/USD").unwrap();
    let minute = hub.candle_snapshot(&market, Span::Minute).unwrap();
    assert_eq!(minute.close, dec!(100));
    assert_eq!(minute.volume, dec!(3));
}

/// S3 — a `complete_redelegation` event resolves its matching `begin_redelegation` record
/// through the completion-time window scan and pushes it to a subscribed connection.
#[tokio::test]
async fn delegation_completion_fans_out_to_subscriber() {
    let store = Arc::new(MemoryStore::new());
    let registry: Arc<SubscriptionRegistry<Recorder>> = Arc::new(SubscriptionRegistry::new());
    let (mut hub, _offset) =
        Hub::resume(store.clone(), registry.clone(), HistoryConfig::default(), 0).unwrap();

    hub.consume("height_info", &payload(&HeightInfo { height: 1, time: 1_000 })).await;
    hub.consume(
        "begin_redelegation",
        &payload(&DelegationLifecycle { delegator: "alice".into(), completion_time: 2_000 }),
    )
    .await;
    hub.consume("commit", &[]).await;
    hub.consume("height_info", &payload(&HeightInfo { height: 2, time: 2_000 })).await;

    let recorder = Recorder::default();
    let id = registry.add_conn(recorder.clone());
    registry.subscribe(id, parse_arg("redelegation:alice").unwrap()).unwrap();

    hub.consume(
        "complete_redelegation",
        &payload(&CompleteDelegation { delegator: "alice".into() }),
    )
    .await;

    let frames = recorder.frames();
    assert_eq!(frames.len(), 1);
    let parsed: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(parsed["type"], "redelegation");
    assert_eq!(parsed["payload"]["delegator"], "alice");
    assert_eq!(parsed["payload"]["completion_time"], 2_000);
}

/// S5 — a block's resting-order deltas are pushed at full resolution to an `"all"`-level
/// subscriber and re-bucketed for a subscriber that requested a coarser price level.
#[tokio::test]
async fn depth_subscribers_receive_level_appropriate_frames() {
    let store = Arc::new(MemoryStore::new());
    let registry: Arc<SubscriptionRegistry<Recorder>> = Arc::new(SubscriptionRegistry::new());
    let (mut hub, _offset) =
        Hub::resume(store.clone(), registry.clone(), HistoryConfig::default(), 0).unwrap();

    let all = Recorder::default();
    let bucketed = Recorder::default();
    let all_id = registry.add_conn(all.clone());
    let bucket_id = registry.add_conn(bucketed.clone());
    registry.subscribe(all_id, parse_arg("depth:BTC/USD").unwrap()).unwrap();
    registry.subscribe(bucket_id, parse_arg("depth:BTC/USD:0.1").unwrap()).unwrap();

    for (price, quantity) in [(dec!(10.01), dec!(1)), (dec!(10.04), dec!(2)), (dec!(10.20), dec!(5))] {
        hub.consume(
            "create_order_info",
            &payload(&CreateOrderInfo {
                sender: "maker".into(),
                order_id: "maker-1".into(),
                stock: "BTC".into(),
                money: "USD".into(),
                side: OrderSide::Sell,
                price,
                quantity,
            }),
        )
        .await;
    }
    commit::run(&mut hub).await.unwrap();

    let all_frame: serde_json::Value = serde_json::from_str(&all.frames()[0]).unwrap();
    let all_levels = all_frame["payload"].as_array().unwrap();
    assert_eq!(all_levels.len(), 3);

    let bucket_frame: serde_json::Value = serde_json::from_str(&bucketed.frames()[0]).unwrap();
    let bucket_levels = bucket_frame["payload"].as_array().unwrap();
    assert_eq!(bucket_levels.len(), 2);
    assert_eq!(dec_field(&bucket_levels[0]["price"]), dec!(10.0));
    assert_eq!(dec_field(&bucket_levels[0]["quantity"]), dec!(3));
    assert_eq!(dec_field(&bucket_levels[1]["price"]), dec!(10.2));
    assert_eq!(dec_field(&bucket_levels[1]["quantity"]), dec!(5));
}

/// S6 — a process that crashes before its commit flush leaves no trace in the store; resuming
/// and replaying the same events from the last persisted offset reaches the same end state as a
/// run that never crashed.
#[tokio::test]
async fn crash_before_flush_then_resume_matches_never_failed_run() {
    async fn run_once<S: hub_core::store::KeyValueStore>(
        store: Arc<S>,
        registry: Arc<SubscriptionRegistry<Recorder>>,
        commit_at_end: bool,
    ) {
        let (mut hub, _offset) =
            Hub::resume(store.clone(), registry, HistoryConfig::default(), 0).unwrap();
        hub.consume("height_info", &payload(&HeightInfo { height: 1, time: 1_000 })).await;
        hub.consume(
            "create_order_info",
            &payload(&CreateOrderInfo {
                sender: "bob".into(),
                order_id: "bob-1".into(),
                stock: "ETH".into(),
                money: "USD".into(),
                side: OrderSide::Buy,
                price: dec!(50),
                quantity: dec!(4),
            }),
        )
        .await;
        if commit_at_end {
            hub.consume("commit", &[]).await;
        }
        // Simulates a crash: `hub` (and its unflushed batch) is simply dropped.
    }

    let never_failed_store = Arc::new(MemoryStore::new());
    let registry_a: Arc<SubscriptionRegistry<Recorder>> = Arc::new(SubscriptionRegistry::new());
    run_once(never_failed_store.clone(), registry_a, true).await;

    let crashed_store = Arc::new(MemoryStore::new());
    let registry_b1: Arc<SubscriptionRegistry<Recorder>> = Arc::new(SubscriptionRegistry::new());
    run_once(crashed_store.clone(), registry_b1, false).await;
    assert!(crashed_store.snapshot().is_empty(), "nothing should be durable before the first flush");

    let registry_b2: Arc<SubscriptionRegistry<Recorder>> = Arc::new(SubscriptionRegistry::new());
    run_once(crashed_store.clone(), registry_b2, true).await;

    assert_eq!(crashed_store.snapshot(), never_failed_store.snapshot());
}

/// S2 + S4 — a subscriber's `subscribe` replays matching history newest-first before the live
/// subscription is registered, a subsequent live event is then delivered over the same socket,
/// and a malformed subscribe argument is rejected with an `error` frame rather than closing the
/// connection.
#[tokio::test]
async fn websocket_replay_then_live_push_and_rejects_bad_subscription() {
    let store = Arc::new(MemoryStore::new());
    let registry: Arc<SubscriptionRegistry<ConnectionHandle>> = Arc::new(SubscriptionRegistry::new());
    let (mut hub, _offset) =
        Hub::resume(store.clone(), registry, HistoryConfig::default(), 0).unwrap();

    hub.consume("height_info", &payload(&HeightInfo { height: 1, time: 1_000 })).await;
    hub.consume(
        "create_order_info",
        &payload(&CreateOrderInfo {
            sender: "carol".into(),
            order_id: "carol-1".into(),
            stock: "BTC".into(),
            money: "USD".into(),
            side: OrderSide::Sell,
            price: dec!(100),
            quantity: dec!(1),
        }),
    )
    .await;
    hub.consume(
        "fill_order_info",
        &payload(&FillOrderInfo {
            order_id: "carol-1".into(),
            stock: "BTC".into(),
            money: "USD".into(),
            side: OrderSide::Sell,
            deal_money: dec!(100),
            deal_stock: dec!(1),
        }),
    )
    .await;
    hub.consume("height_info", &payload(&HeightInfo { height: 2, time: 2_000 })).await;
    hub.consume(
        "fill_order_info",
        &payload(&FillOrderInfo {
            order_id: "carol-1".into(),
            stock: "BTC".into(),
            money: "USD".into(),
            side: OrderSide::Sell,
            deal_money: dec!(210),
            deal_stock: dec!(2),
        }),
    )
    .await;
    hub.consume("commit", &[]).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handles = hub.handles();
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    tokio::spawn(server::serve(listener, handles, shutdown_rx));

    let (ws, _resp) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
    let (mut write, mut read) = ws.split();

    write
        .send(tokio_tungstenite::tungstenite::Message::Text(
            serde_json::json!({"op": "subscribe", "args": ["deal:BTC/USD"], "depth": 2}).to_string().into(),
        ))
        .await
        .unwrap();

    let mut received = Vec::new();
    while received.len() < 3 {
        let msg = read.next().await.unwrap().unwrap();
        if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
            received.push(serde_json::from_str::<serde_json::Value>(&text).unwrap());
        }
    }

    // Two replayed deal rows, newest (volume 2) first, then the "subscribed" ack.
    assert_eq!(received[0]["type"], "deal");
    assert_eq!(dec_field(&received[0]["payload"]["volume"]), dec!(2));
    assert_eq!(received[1]["type"], "deal");
    assert_eq!(dec_field(&received[1]["payload"]["volume"]), dec!(1));
    assert_eq!(received[2]["type"], "subscribed");

    // A live event published after the subscription is registered reaches the same socket.
    hub.consume(
        "fill_order_info",
        &payload(&FillOrderInfo {
            order_id: "carol-1".into(),
            stock: "BTC".into(),
            money: "USD".into(),
            side: OrderSide::Sell,
            deal_money: dec!(300),
            deal_stock: dec!(3),
        }),
    )
    .await;

    let live = read.next().await.unwrap().unwrap();
    let tokio_tungstenite::tungstenite::Message::Text(live_text) = live else {
        panic!("expected a text frame");
    };
    let live: serde_json::Value = serde_json::from_str(&live_text).unwrap();
    assert_eq!(live["type"], "deal");
    assert_eq!(dec_field(&live["payload"]["volume"]), dec!(3));

    // A malformed subscribe argument rejects with an `error` frame; the connection stays open.
    write
        .send(tokio_tungstenite::tungstenite::Message::Text(
            serde_json::json!({"op": "subscribe", "args": ["kline:BTC/USD:5min"]}).to_string().into(),
        ))
        .await
        .unwrap();
    let err = read.next().await.unwrap().unwrap();
    let tokio_tungstenite::tungstenite::Message::Text(err_text) = err else {
        panic!("expected a text frame");
    };
    let err: serde_json::Value = serde_json::from_str(&err_text).unwrap();
    assert_eq!(err["type"], "error");
}

/// A replayed `order` history frame is tagged by its suffix (`create_order`/`fill_order`), the
/// same way a live order push is tagged, rather than the generic `"order"` topic name.
#[tokio::test]
async fn order_history_replay_uses_suffix_frame_type() {
    let store = Arc::new(MemoryStore::new());
    let registry: Arc<SubscriptionRegistry<ConnectionHandle>> = Arc::new(SubscriptionRegistry::new());
    let (mut hub, _offset) =
        Hub::resume(store.clone(), registry, HistoryConfig::default(), 0).unwrap();

    hub.consume("height_info", &payload(&HeightInfo { height: 1, time: 1_000 })).await;
    hub.consume(
        "create_order_info",
        &payload(&CreateOrderInfo {
            sender: "dave".into(),
            order_id: "dave-1".into(),
            stock: "BTC".into(),
            money: "USD".into(),
            side: OrderSide::Sell,
            price: dec!(100),
            quantity: dec!(1),
        }),
    )
    .await;
    hub.consume(
        "fill_order_info",
        &payload(&FillOrderInfo {
            order_id: "dave-1".into(),
            stock: "BTC".into(),
            money: "USD".into(),
            side: OrderSide::Sell,
            deal_money: dec!(100),
            deal_stock: dec!(1),
        }),
    )
    .await;
    hub.consume("commit", &[]).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handles = hub.handles();
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    tokio::spawn(server::serve(listener, handles, shutdown_rx));

    let (ws, _resp) = tokio_tungstenite::connect_async(format!("ws://{addr}")).await.unwrap();
    let (mut write, mut read) = ws.split();

    write
        .send(tokio_tungstenite::tungstenite::Message::Text(
            serde_json::json!({"op": "subscribe", "args": ["order:dave"], "depth": 10}).to_string().into(),
        ))
        .await
        .unwrap();

    let mut received = Vec::new();
    while received.len() < 3 {
        let msg = read.next().await.unwrap().unwrap();
        if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
            received.push(serde_json::from_str::<serde_json::Value>(&text).unwrap());
        }
    }

    // Newest first: the fill replays before the create, each tagged by its own suffix rather
    // than the generic "order" topic name, and the "subscribed" ack comes last.
    assert_eq!(received[0]["type"], "fill_order");
    assert_eq!(received[1]["type"], "create_order");
    assert_eq!(received[2]["type"], "subscribed");
}
