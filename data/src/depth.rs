//! Per-(market, side) order-book depth aggregation.
//!
//! Locking is the caller's responsibility (see `hub-core`'s depth read/write lock); this type is
//! plain synchronous state so it can be exercised without any lock machinery in tests.

use crate::market::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One resting price level and its quantity, as emitted by [`DepthManager::end_block`].
///
/// A `quantity` of zero is a tombstone: the price has been fully consumed and removed from the
/// live book, and subscribers should drop that level.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Tracks price→quantity deltas accumulated within the current block, and the live resting book
/// they get folded into at block end.
#[derive(Debug, Clone)]
pub struct DepthManager {
    side: Side,
    live: BTreeMap<Decimal, Decimal>,
    delta: BTreeMap<Decimal, Decimal>,
}

impl DepthManager {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            live: BTreeMap::new(),
            delta: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Accumulates a signed quantity change against `price` for the current block.
    pub fn delta_change(&mut self, price: Decimal, signed_qty: Decimal) {
        *self.delta.entry(price).or_insert(Decimal::ZERO) += signed_qty;
    }

    /// Folds every touched price's delta into the live book, clears the delta map, and returns
    /// the emitted levels in the canonical order for this side (ascending price for sell,
    /// descending for buy).
    pub fn end_block(&mut self) -> Vec<DepthLevel> {
        if self.delta.is_empty() {
            return Vec::new();
        }

        let mut emitted = Vec::with_capacity(self.delta.len());
        for (price, change) in std::mem::take(&mut self.delta) {
            let new_qty = self.live.get(&price).copied().unwrap_or(Decimal::ZERO) + change;
            if new_qty.is_zero() {
                self.live.remove(&price);
                emitted.push(DepthLevel {
                    price,
                    quantity: Decimal::ZERO,
                });
            } else {
                self.live.insert(price, new_qty);
                emitted.push(DepthLevel {
                    price,
                    quantity: new_qty,
                });
            }
        }

        match self.side {
            Side::Sell => emitted.sort_by(|a, b| a.price.cmp(&b.price)),
            Side::Buy => emitted.sort_by(|a, b| b.price.cmp(&a.price)),
        }
        emitted
    }

    /// Snapshot of the `n` best price levels, ascending by price.
    pub fn get_lowest(&self, n: usize) -> Vec<DepthLevel> {
        self.live
            .iter()
            .take(n)
            .map(|(&price, &quantity)| DepthLevel { price, quantity })
            .collect()
    }

    /// Snapshot of the `n` best price levels, descending by price.
    pub fn get_highest(&self, n: usize) -> Vec<DepthLevel> {
        self.live
            .iter()
            .rev()
            .take(n)
            .map(|(&price, &quantity)| DepthLevel { price, quantity })
            .collect()
    }

    /// Aggregates the full live book into `bucket`-sized price buckets, summing quantity, in the
    /// canonical order for this side. Serves subscribers asking for a coarser depth level than
    /// the raw per-price book.
    pub fn bucketed_snapshot(&self, bucket: Decimal) -> Vec<DepthLevel> {
        let mut buckets: BTreeMap<Decimal, Decimal> = BTreeMap::new();
        for (&price, &qty) in self.live.iter() {
            let bucket_price = (price / bucket).floor() * bucket;
            *buckets.entry(bucket_price).or_insert(Decimal::ZERO) += qty;
        }
        let mut levels: Vec<DepthLevel> = buckets
            .into_iter()
            .map(|(price, quantity)| DepthLevel { price, quantity })
            .collect();
        match self.side {
            Side::Sell => levels.sort_by(|a, b| a.price.cmp(&b.price)),
            Side::Buy => levels.sort_by(|a, b| b.price.cmp(&a.price)),
        }
        levels
    }
}
