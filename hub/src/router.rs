//! # Event router (the hub)
//!
//! Owns every in-memory aggregate manager and the write side of the key-value batch. Dispatches
//! one decoded upstream event at a time, in ingest order, updating aggregates, persisting, and
//! enqueueing pushes — the router never returns an error to its caller, it only logs and
//! continues; the sole exception is a failed commit flush, which is fatal by design.
//!
//! Depth and ticker state live behind their own `parking_lot::RwLock`s so a subscriber's history
//! replay (the server's `depth`/`ticker` handling) can read a consistent snapshot concurrently
//! with the router applying the next block's deltas. The key-value store's own locking (an
//! internal `RwLock` for
//! [`crate::router::Hub`]'s [`MemoryStore`](hub_core::store::MemoryStore), MVCC iterators for
//! `RocksStore`) plays the same role for `keyValueLock`.

use crate::query;
use chrono::Timelike;
use hub_core::{
    config::HistoryConfig,
    delivery::{self, Pushable},
    error::{HubError, StoreError},
    registry::SubscriptionRegistry,
    store::{Batch, KeyValueStore},
    topic::{Detail, Topic},
};
use hub_data::{
    candle::{CandlestickManager, Span},
    codec,
    depth::DepthManager,
    event::{
        self, BancorInfo, BancorTrade, CompleteDelegation, CreateOrderInfo, DelOrderInfo,
        DelegationLifecycle, FillOrderInfo, HeightInfo, NotifySlash, NotifyTx, NotifyUnlock,
        TokenComment,
    },
    kind::{Kind, LifecycleSuffix, OrderSuffix, UpstreamKind},
    market::{Market, Side},
    ticker::TickerManager,
};
use indexmap::IndexMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{error, warn};

/// Both resting-order-book sides for one market.
#[derive(Debug)]
pub struct DepthBook {
    pub sell: DepthManager,
    pub buy: DepthManager,
}

impl DepthBook {
    fn new() -> Self {
        Self {
            sell: DepthManager::new(Side::Sell),
            buy: DepthManager::new(Side::Buy),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut DepthManager {
        match side {
            Side::Sell => &mut self.sell,
            Side::Buy => &mut self.buy,
        }
    }
}

/// Shared handles the server's connection tasks read from concurrently with the router: the
/// store, the subscription registry, and the live depth/ticker snapshots. Cloning is cheap —
/// every field is an `Arc`.
pub struct Handles<S, H> {
    pub store: Arc<S>,
    pub registry: Arc<SubscriptionRegistry<H>>,
    pub depth: Arc<RwLock<IndexMap<Market, DepthBook>>>,
    pub ticker: Arc<RwLock<IndexMap<Market, TickerManager>>>,
    /// The current block clock, mirrored out of `Hub` so the server's replay path can compute a
    /// ticker's minute-of-day without holding a reference to `Hub` itself (which is owned
    /// exclusively by the intake task).
    pub block_time: Arc<AtomicU64>,
    pub history: HistoryConfig,
}

impl<S, H> Clone for Handles<S, H> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            registry: self.registry.clone(),
            depth: self.depth.clone(),
            ticker: self.ticker.clone(),
            block_time: self.block_time.clone(),
            history: self.history,
        }
    }
}

/// Process-recovery metadata written atomically into every commit batch: the upstream offset the
/// batch advances to, the monotonic serial id counter, and the block clock. Recovering this on
/// startup makes `serialId` strictly increasing across restarts, not just within one process
/// lifetime, and lets the intake loop resume the upstream transport from exactly where the last
/// durable flush left off.
const META_KEY: &[u8] = b"\xffmeta";

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
struct Meta {
    offset: i64,
    serial_id: u64,
    last_block_time: u64,
    curr_block_time: u64,
}

/// The event router. Owned exclusively by the intake task; never shared behind an `Arc` (see
/// [`Handles`] for the pieces that do need concurrent readers).
pub struct Hub<S, H> {
    handles: Handles<S, H>,
    candles: CandlestickManager,
    batch: Batch,
    serial_id: u64,
    last_block_time: u64,
    curr_block_time: u64,
    offset: i64,
}

impl<S: KeyValueStore, H: Pushable> Hub<S, H> {
    /// Recovers `Meta` from `store` if a previous run committed one, otherwise starts fresh from
    /// `start_offset`. Returns the `Hub` plus the offset the intake loop should seek the upstream
    /// transport to.
    pub fn resume(
        store: Arc<S>,
        registry: Arc<SubscriptionRegistry<H>>,
        history: HistoryConfig,
        start_offset: i64,
    ) -> Result<(Self, i64), StoreError> {
        let meta = store
            .get(META_KEY)?
            .and_then(|bytes| serde_json::from_slice::<Meta>(&bytes).ok());
        let (offset, serial_id, last_block_time, curr_block_time) = match meta {
            Some(meta) => (meta.offset, meta.serial_id, meta.last_block_time, meta.curr_block_time),
            None => (start_offset, 0, 0, 0),
        };
        let hub = Self {
            handles: Handles {
                store,
                registry,
                depth: Arc::new(RwLock::new(IndexMap::new())),
                ticker: Arc::new(RwLock::new(IndexMap::new())),
                block_time: Arc::new(AtomicU64::new(curr_block_time)),
                history,
            },
            candles: CandlestickManager::new(),
            batch: Batch::new(),
            serial_id,
            last_block_time,
            curr_block_time,
            offset,
        };
        Ok((hub, offset))
    }

    /// Shared handles for the server's replay and history-query paths.
    pub fn handles(&self) -> Handles<S, H> {
        self.handles.clone()
    }

    /// Snapshot of one market's in-progress candlestick record for `span`. The candlestick
    /// manager otherwise stays internal to the router; this is the read-side equivalent of
    /// `CandlestickManager::get_record` for callers that only hold a `Hub`.
    pub fn candle_snapshot(&self, market: &Market, span: hub_data::candle::Span) -> Option<hub_data::candle::CandleRecord> {
        self.candles.get_record(market, span)
    }

    /// Records the offset of the most recently consumed upstream message, so the next commit
    /// persists it atomically with the data it produced.
    pub fn note_offset(&mut self, offset: i64) {
        self.offset = offset;
    }

    pub fn batch_is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Decodes one upstream message and dispatches it per the kind table. Never returns an
    /// error: a decode failure is logged and the message is dropped; the stream continues.
    pub async fn consume(&mut self, wire_kind: &str, payload: &[u8]) {
        let Some(kind) = UpstreamKind::parse(wire_kind) else {
            warn!(wire_kind, "unknown upstream kind, dropping message");
            return;
        };

        let result: Result<(), HubError> = match kind {
            UpstreamKind::HeightInfo => self.on_height_info(payload).await.map_err(HubError::from),
            UpstreamKind::NotifySlash => self.on_notify_slash(payload).await.map_err(HubError::from),
            UpstreamKind::NotifyTx => self.on_notify_tx(payload).await.map_err(HubError::from),
            UpstreamKind::BeginRedelegation => self
                .on_begin_delegation(payload, Kind::Redelegation)
                .map_err(HubError::from),
            UpstreamKind::BeginUnbonding => self
                .on_begin_delegation(payload, Kind::Unbonding)
                .map_err(HubError::from),
            UpstreamKind::CompleteRedelegation => self
                .on_complete_delegation(payload, Kind::Redelegation, Topic::Redelegation, "redelegation")
                .await
                .map_err(HubError::from),
            UpstreamKind::CompleteUnbonding => self
                .on_complete_delegation(payload, Kind::Unbonding, Topic::Unbonding, "unbonding")
                .await
                .map_err(HubError::from),
            UpstreamKind::NotifyUnlock => self.on_notify_unlock(payload).await.map_err(HubError::from),
            UpstreamKind::TokenComment => self.on_token_comment(payload).await.map_err(HubError::from),
            UpstreamKind::CreateOrderInfo => self.on_create_order(payload).await.map_err(HubError::from),
            UpstreamKind::FillOrderInfo => self.on_fill_order(payload).await.map_err(HubError::from),
            UpstreamKind::DelOrderInfo => self.on_del_order(payload).await.map_err(HubError::from),
            UpstreamKind::BancorTrade => self.on_bancor_trade(payload).await.map_err(HubError::from),
            UpstreamKind::BancorInfo => self.on_bancor_info(payload).await.map_err(HubError::from),
            UpstreamKind::Commit => {
                if let Err(err) = self.run_commit_cycle().await {
                    error!(?err, "commit flush failed, exiting so upstream replays from the last persisted offset");
                    std::process::exit(1);
                }
                Ok(())
            }
        };

        if let Err(err) = result {
            warn!(wire_kind, %err, "dropping malformed event");
        }
    }

    fn decode<T: DeserializeOwned>(payload: &[u8], what: &'static str) -> Result<T, hub_data::error::DataError> {
        serde_json::from_slice(payload).map_err(|source| hub_data::error::DataError::Decode { kind: what, source })
    }

    /// Appends one record to the open batch under a key whose time component is `block_time`,
    /// returning the serial id it was assigned.
    fn persist_at(&mut self, kind: Kind, subject: &[u8], suffix: u8, block_time: u64, value: Vec<u8>) -> Result<u64, hub_data::error::DataError> {
        let key = codec::encode(kind, subject, suffix, block_time, self.serial_id)?;
        self.batch.set(key, value);
        let sid = self.serial_id;
        self.serial_id += 1;
        Ok(sid)
    }

    /// As [`Self::persist_at`], keyed under the current block time.
    fn persist(&mut self, kind: Kind, subject: &[u8], suffix: u8, value: Vec<u8>) -> Result<u64, hub_data::error::DataError> {
        let curr = self.curr_block_time;
        self.persist_at(kind, subject, suffix, curr, value)
    }

    /// Appends a full payload under a `Detail` key, addressable later by the serial id returned.
    fn persist_detail(&mut self, value: Vec<u8>) -> u64 {
        let sid = self.serial_id;
        self.serial_id += 1;
        self.batch.set(codec::detail_key(sid), value);
        sid
    }

    fn ensure_market(&mut self, market: &Market) {
        self.candles.add_market(market, self.curr_block_time);
        self.handles
            .depth
            .write()
            .entry(market.clone())
            .or_insert_with(DepthBook::new);
        self.handles
            .ticker
            .write()
            .entry(market.clone())
            .or_insert_with(TickerManager::new);
    }

    async fn publish(&self, topic: Topic, subject: Option<&str>, kind: &str, payload: &impl Serialize) {
        if let Err(err) = delivery::publish(&self.handles.registry, topic, subject, kind, payload).await {
            warn!(%err, kind, "failed to serialise push payload");
        }
    }

    async fn on_height_info(&mut self, payload: &[u8]) -> Result<(), hub_data::error::DataError> {
        let info: HeightInfo = Self::decode(payload, "height_info")?;
        let block_time = info.time.max(0) as u64;

        self.batch.set(codec::height_key(info.height), block_time.to_le_bytes().to_vec());
        self.publish(Topic::BlockInfo, None, "blockinfo", &info).await;

        self.last_block_time = self.curr_block_time;
        self.curr_block_time = block_time;
        self.handles.block_time.store(block_time, Ordering::Relaxed);

        let completed = self.candles.new_block(self.curr_block_time);
        for bar in completed {
            let subject = bar.market.as_str().as_bytes().to_vec();
            if let Err(err) = self.persist_at(Kind::Candlestick, &subject, span_suffix(bar.span), bar.begin, serde_json::to_vec(&bar).unwrap_or_default()) {
                warn!(%err, "failed to persist candlestick bar");
                continue;
            }

            let subs = self.handles.registry.subscribers(Topic::Kline, Some(bar.market.as_str()));
            let matching: Vec<_> = subs
                .into_iter()
                .filter(|(_, _, detail)| matches!(detail, Detail::Span(span) if *span == bar.span))
                .collect();
            if !matching.is_empty() {
                match delivery::frame_text("kline", &bar) {
                    Ok(frame) => delivery::push_to(&self.handles.registry, matching, frame).await,
                    Err(err) => warn!(%err, "failed to serialise kline push"),
                }
            }

            if bar.span == Span::Minute {
                let minute = minute_of_day_from_unix(self.curr_block_time);
                self.handles
                    .ticker
                    .write()
                    .entry(bar.market.clone())
                    .or_insert_with(TickerManager::new)
                    .update_newest_price(bar.close, minute);
            }
        }
        Ok(())
    }

    /// `notify_slash` has no reserved kind byte: it is live-push-only, with no historical index
    /// to replay on subscribe.
    async fn on_notify_slash(&mut self, payload: &[u8]) -> Result<(), hub_data::error::DataError> {
        let info: NotifySlash = Self::decode(payload, "notify_slash")?;
        self.publish(Topic::Slash, None, "slash", &info).await;
        Ok(())
    }

    async fn on_notify_tx(&mut self, payload: &[u8]) -> Result<(), hub_data::error::DataError> {
        let tx: NotifyTx = Self::decode(payload, "notify_tx")?;
        let detail_serial = self.persist_detail(payload.to_vec());

        for signer in &tx.signers {
            if let Err(err) = self.persist(Kind::Tx, signer.as_bytes(), 0, detail_serial.to_be_bytes().to_vec()) {
                warn!(%err, signer, "failed to persist tx pointer");
                continue;
            }
            self.publish(Topic::Tx, Some(signer), "tx", &tx).await;
        }
        for transfer in &tx.transfers {
            if let Err(err) = self.persist(Kind::Income, transfer.recipient.as_bytes(), 0, detail_serial.to_be_bytes().to_vec()) {
                warn!(%err, recipient = %transfer.recipient, "failed to persist income pointer");
                continue;
            }
            self.publish(Topic::Income, Some(&transfer.recipient), "income", &tx).await;
        }
        Ok(())
    }

    /// `begin_redelegation`/`begin_unbonding`: the key's time component is the completion
    /// timestamp, not the ingest block time — this is what lets the matching `complete_*` event
    /// find it later with a plain time-range reverse scan.
    fn on_begin_delegation(&mut self, payload: &[u8], kind: Kind) -> Result<(), hub_data::error::DataError> {
        let lifecycle: DelegationLifecycle = Self::decode(payload, "begin_delegation")?;
        let completion_time = lifecycle.completion_time.max(0) as u64;
        self.persist_at(kind, lifecycle.delegator.as_bytes(), LifecycleSuffix::Begin.byte(), completion_time, payload.to_vec())?;
        Ok(())
    }

    async fn on_complete_delegation(
        &mut self,
        payload: &[u8],
        kind: Kind,
        topic: Topic,
        tag: &str,
    ) -> Result<(), hub_data::error::DataError> {
        let complete: CompleteDelegation = Self::decode(payload, "complete_delegation")?;
        let cap = self.handles.history.max_depth;
        let found = match query::scan_completion_window(
            self.handles.store.as_ref(),
            kind,
            complete.delegator.as_bytes(),
            self.last_block_time,
            self.curr_block_time,
            cap,
        ) {
            Ok(found) => found,
            Err(err) => {
                warn!(%err, "failed to scan delegation completion window");
                return Ok(());
            }
        };

        for raw in found {
            match serde_json::from_slice::<serde_json::Value>(&raw) {
                Ok(value) => self.publish(topic, Some(&complete.delegator), tag, &value).await,
                Err(err) => warn!(%err, "stored delegation record was not valid json"),
            }
        }
        Ok(())
    }

    async fn on_notify_unlock(&mut self, payload: &[u8]) -> Result<(), hub_data::error::DataError> {
        let unlock: NotifyUnlock = Self::decode(payload, "notify_unlock")?;
        self.persist(Kind::Unlock, unlock.address.as_bytes(), 0, payload.to_vec())?;
        self.publish(Topic::Unlock, Some(&unlock.address), "unlock", &unlock).await;
        Ok(())
    }

    async fn on_token_comment(&mut self, payload: &[u8]) -> Result<(), hub_data::error::DataError> {
        let comment: TokenComment = Self::decode(payload, "token_comment")?;
        self.persist(Kind::Comment, comment.token.as_bytes(), 0, payload.to_vec())?;
        self.publish(Topic::Comment, Some(&comment.token), "comment", &comment).await;
        Ok(())
    }

    async fn on_create_order(&mut self, payload: &[u8]) -> Result<(), hub_data::error::DataError> {
        let order: CreateOrderInfo = Self::decode(payload, "create_order_info")?;
        let market = Market::new(&order.stock, &order.money);
        self.ensure_market(&market);

        self.persist(Kind::Order, order.sender.as_bytes(), OrderSuffix::Create.byte(), payload.to_vec())?;
        self.publish(Topic::Order, Some(&order.sender), OrderSuffix::Create.frame_type(), &order).await;

        self.handles
            .depth
            .write()
            .entry(market)
            .or_insert_with(DepthBook::new)
            .side_mut(order.side.into())
            .delta_change(order.price, order.quantity);
        Ok(())
    }

    async fn on_fill_order(&mut self, payload: &[u8]) -> Result<(), hub_data::error::DataError> {
        let fill: FillOrderInfo = Self::decode(payload, "fill_order_info")?;
        let Some((account, _sequence)) = event::split_order_id(&fill.order_id) else {
            return Err(hub_data::error::DataError::MalformedOrderId(fill.order_id));
        };
        let market = Market::new(&fill.stock, &fill.money);
        self.ensure_market(&market);

        self.persist(Kind::Order, account.as_bytes(), OrderSuffix::Fill.byte(), payload.to_vec())?;
        self.publish(Topic::Order, Some(account), OrderSuffix::Fill.frame_type(), &fill).await;

        if !fill.deal_stock.is_zero() {
            let price = fill.deal_money / fill.deal_stock;
            self.candles.update(&market, self.curr_block_time, price, fill.deal_stock);

            self.handles
                .depth
                .write()
                .entry(market.clone())
                .or_insert_with(DepthBook::new)
                .side_mut(fill.side.into())
                .delta_change(price, -fill.deal_stock);

            let deal = DealRecord {
                market: market.as_str().to_string(),
                account: account.to_string(),
                price,
                volume: fill.deal_stock,
            };
            self.persist(Kind::Deal, market.as_str().as_bytes(), 0, serde_json::to_vec(&deal).unwrap_or_default())?;
            self.publish(Topic::Deal, Some(market.as_str()), "deal", &deal).await;
        }
        Ok(())
    }

    async fn on_del_order(&mut self, payload: &[u8]) -> Result<(), hub_data::error::DataError> {
        let cancel: DelOrderInfo = Self::decode(payload, "del_order_info")?;
        let Some((account, _sequence)) = event::split_order_id(&cancel.order_id) else {
            return Err(hub_data::error::DataError::MalformedOrderId(cancel.order_id));
        };
        let market = Market::new(&cancel.stock, &cancel.money);
        self.ensure_market(&market);

        self.persist(Kind::Order, account.as_bytes(), OrderSuffix::Cancel.byte(), payload.to_vec())?;
        self.publish(Topic::Order, Some(account), OrderSuffix::Cancel.frame_type(), &cancel).await;

        self.handles
            .depth
            .write()
            .entry(market)
            .or_insert_with(DepthBook::new)
            .side_mut(cancel.side.into())
            .delta_change(cancel.price, -cancel.left_stock);
        Ok(())
    }

    async fn on_bancor_trade(&mut self, payload: &[u8]) -> Result<(), hub_data::error::DataError> {
        let trade: BancorTrade = Self::decode(payload, "bancor_trade")?;
        self.persist(Kind::BancorTrade, trade.sender.as_bytes(), 0, payload.to_vec())?;
        self.publish(Topic::BancorTrade, Some(&trade.sender), "bancor_trade", &trade).await;
        Ok(())
    }

    /// The original upstream persists under the inverted `MONEY/STOCK` orientation but looks up
    /// subscribers under `STOCK/MONEY` — a known defect. This rewrite uses the canonical
    /// `STOCK/MONEY` orientation for both the persisted key and the subscriber
    /// lookup.
    async fn on_bancor_info(&mut self, payload: &[u8]) -> Result<(), hub_data::error::DataError> {
        let info: BancorInfo = Self::decode(payload, "bancor_info")?;
        let Some(market) = Market::from_inverted(&info.money_stock_pair) else {
            return Err(hub_data::error::DataError::MalformedMarketPair(info.money_stock_pair));
        };
        self.persist(Kind::BancorInfo, market.as_str().as_bytes(), 0, payload.to_vec())?;
        self.publish(Topic::Bancor, Some(market.as_str()), "bancor", &info).await;
        Ok(())
    }

    async fn run_commit_cycle(&mut self) -> Result<(), StoreError> {
        crate::commit::run(self).await
    }

    pub(crate) fn handles_ref(&self) -> &Handles<S, H> {
        &self.handles
    }

    pub(crate) fn curr_block_time(&self) -> u64 {
        self.curr_block_time
    }

    pub(crate) fn take_batch_with_meta(&mut self) -> Batch {
        let meta = Meta {
            offset: self.offset,
            serial_id: self.serial_id,
            last_block_time: self.last_block_time,
            curr_block_time: self.curr_block_time,
        };
        self.batch
            .set(META_KEY.to_vec(), serde_json::to_vec(&meta).unwrap_or_default());
        std::mem::take(&mut self.batch)
    }
}

/// One trade fill, persisted under the `Deal` kind and pushed to `deal` topic subscribers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DealRecord {
    pub market: String,
    pub account: String,
    pub price: Decimal,
    pub volume: Decimal,
}

pub(crate) fn span_suffix(span: Span) -> u8 {
    match span {
        Span::Minute => 0,
        Span::Hour => 1,
        Span::Day => 2,
    }
}

pub(crate) fn minute_of_day_from_unix(unix_seconds: u64) -> usize {
    let dt = chrono::DateTime::<chrono::Utc>::from_timestamp(unix_seconds as i64, 0).unwrap_or_default();
    hub_data::ticker::minute_of_day(dt.hour(), dt.minute())
}
