//! # Commit cycle
//!
//! Runs once per `commit` upstream event, after every event belonging to that block has already
//! been dispatched by [`crate::router::Hub::consume`]: push ticker updates, fold each market's
//! depth deltas into the live book and push the resulting levels (bucketed per subscriber), then
//! durably flush the batch those events built up. The flush is the one place a failure is fatal —
//! everything upstream of it only logs and continues.

use crate::router::Hub;
use hub_core::{
    delivery::{self, Pushable},
    error::StoreError,
    registry::ConnId,
    store::KeyValueStore,
    topic::{Detail, Topic},
};
use hub_data::{
    depth::DepthLevel,
    market::Market,
};
use rust_decimal::Decimal;
use std::{collections::BTreeMap, str::FromStr};
use tracing::warn;

pub async fn run<S: KeyValueStore, H: Pushable>(hub: &mut Hub<S, H>) -> Result<(), StoreError> {
    push_tickers(hub).await;
    push_depth(hub).await;

    let batch = hub.take_batch_with_meta();
    hub.handles_ref().store.write_sync(batch)
}

async fn push_tickers<S: KeyValueStore, H: Pushable>(hub: &Hub<S, H>) {
    let handles = hub.handles_ref();
    let targets = handles.registry.ticker_subscriptions();
    if targets.is_empty() {
        return;
    }

    let minute = crate::router::minute_of_day_from_unix(hub.curr_block_time());
    let snapshot = handles.ticker.read();
    for (id, handle, markets) in targets {
        for market_str in &markets {
            let Some(market) = Market::parse(market_str) else {
                continue;
            };
            let Some(mgr) = snapshot.get(&market) else {
                continue;
            };
            let Some(ticker) = mgr.get_ticker(&market, minute) else {
                continue;
            };
            match delivery::frame_text("ticker", &ticker) {
                Ok(frame) => {
                    if handle.push_text(frame).await.is_err() {
                        if let Some(evicted) = handles.registry.remove_conn(id) {
                            evicted.close().await;
                        }
                    }
                }
                Err(err) => warn!(%err, "failed to serialise ticker push"),
            }
        }
    }
}

async fn push_depth<S: KeyValueStore, H: Pushable>(hub: &Hub<S, H>) {
    let handles = hub.handles_ref();
    let mut depth = handles.depth.write();
    let mut emitted_by_market = Vec::new();
    for (market, book) in depth.iter_mut() {
        let sell = book.sell.end_block();
        let buy = book.buy.end_block();
        if !sell.is_empty() || !buy.is_empty() {
            emitted_by_market.push((market.clone(), sell, buy));
        }
    }
    drop(depth);

    for (market, sell, buy) in emitted_by_market {
        let mut levels = sell;
        levels.extend(buy);
        if levels.is_empty() {
            continue;
        }
        push_depth_for_market(hub, &market, &levels).await;
    }
}

/// Groups `market`'s subscribers by requested level, buckets the emitted deltas for every level
/// other than `"all"`, and pushes one frame per distinct level.
async fn push_depth_for_market<S: KeyValueStore, H: Pushable>(hub: &Hub<S, H>, market: &Market, levels: &[DepthLevel]) {
    let handles = hub.handles_ref();
    let subs = handles.registry.subscribers(Topic::Depth, Some(market.as_str()));
    if subs.is_empty() {
        return;
    }

    let mut by_level: BTreeMap<String, Vec<(ConnId, H)>> = BTreeMap::new();
    for (id, handle, detail) in subs {
        if let Detail::Level(level) = detail {
            by_level.entry(level).or_default().push((id, handle));
        }
    }

    for (level, targets) in by_level {
        let emitted = if level == "all" {
            levels.to_vec()
        } else {
            match Decimal::from_str(&level) {
                Ok(bucket) => bucket_levels(levels, bucket),
                Err(_) => continue,
            }
        };
        if emitted.is_empty() {
            continue;
        }

        let frame = match delivery::frame_text("depth", &emitted) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "failed to serialise depth push");
                continue;
            }
        };
        for (id, handle) in targets {
            if handle.push_text(frame.clone()).await.is_err() {
                if let Some(evicted) = handles.registry.remove_conn(id) {
                    evicted.close().await;
                }
            }
        }
    }
}

/// Re-buckets a list of already-emitted per-price deltas by summing quantity per `bucket`-sized
/// price bucket, the same way `DepthManager::bucketed_snapshot` buckets the full live book.
fn bucket_levels(levels: &[DepthLevel], bucket: Decimal) -> Vec<DepthLevel> {
    let mut grouped: BTreeMap<Decimal, Decimal> = BTreeMap::new();
    for level in levels {
        let bucket_price = (level.price / bucket).floor() * bucket;
        *grouped.entry(bucket_price).or_insert(Decimal::ZERO) += level.quantity;
    }
    grouped
        .into_iter()
        .map(|(price, quantity)| DepthLevel { price, quantity })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bucket_levels_sums_quantity_per_bucket() {
        let levels = vec![
            DepthLevel { price: dec!(10.003), quantity: dec!(1) },
            DepthLevel { price: dec!(10.007), quantity: dec!(2) },
            DepthLevel { price: dec!(10.012), quantity: dec!(5) },
        ];
        let bucketed = bucket_levels(&levels, dec!(0.01));
        assert_eq!(
            bucketed,
            vec![
                DepthLevel { price: dec!(10.00), quantity: dec!(3) },
                DepthLevel { price: dec!(10.01), quantity: dec!(5) },
            ]
        );
    }
}
