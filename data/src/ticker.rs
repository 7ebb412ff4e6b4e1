//! Per-market 24h ticker reference, backed by a 1440-slot ring (one slot per minute of day).

use crate::market::Market;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of minutes in a day; the ring has exactly one slot per minute.
pub const MINUTES_PER_DAY: usize = 1440;

/// `newPrice`/`oldPrice` pair for one market, as surfaced to `ticker` subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub market: Market,
    pub new_price: Decimal,
    pub old_price: Decimal,
}

/// Minute-of-day ring buffer of close prices for one market.
///
/// `updateNewestPrice` writes into `slot[minuteOfDay]`; `getTicker` reads that same slot as
/// `newPrice` and `slot[(minuteOfDay + 1) % 1440]` — the oldest minute still inside the trailing
/// 24h window — as `oldPrice`.
#[derive(Debug, Clone)]
pub struct TickerManager {
    slots: Vec<Option<Decimal>>,
}

impl TickerManager {
    pub fn new() -> Self {
        Self {
            slots: vec![None; MINUTES_PER_DAY],
        }
    }

    pub fn update_newest_price(&mut self, close_price: Decimal, minute_of_day: usize) {
        self.slots[minute_of_day % MINUTES_PER_DAY] = Some(close_price);
    }

    /// Returns `None` if either the current slot or the 24h-ago slot has never been written.
    pub fn get_ticker(&self, market: &Market, minute_of_day: usize) -> Option<Ticker> {
        let minute_of_day = minute_of_day % MINUTES_PER_DAY;
        let new_price = self.slots[minute_of_day]?;
        let old_price = self.slots[(minute_of_day + 1) % MINUTES_PER_DAY]?;
        Some(Ticker {
            market: market.clone(),
            new_price,
            old_price,
        })
    }
}

impl Default for TickerManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes minute-of-day from an hour/minute pair.
///
/// The upstream source computes this as `hour * minute`, which is an arithmetic bug (e.g.
/// `hour=0` collapses every minute to slot 0). The correct formula is `hour * 60 + minute`.
pub fn minute_of_day(hour: u32, minute: u32) -> usize {
    (hour as usize) * 60 + (minute as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn returns_none_until_both_slots_written() {
        let mgr = TickerManager::new();
        let market = Market::parse("BTC/USD").unwrap();
        assert!(mgr.get_ticker(&market, 10).is_none());
    }

    #[test]
    fn oldest_slot_is_24h_ago_same_minute() {
        let mut mgr = TickerManager::new();
        let market = Market::parse("BTC/USD").unwrap();
        for m in 0..MINUTES_PER_DAY {
            mgr.update_newest_price(Decimal::from(m as i64), m);
        }
        let ticker = mgr.get_ticker(&market, 5).unwrap();
        assert_eq!(ticker.new_price, dec!(5));
        assert_eq!(ticker.old_price, dec!(6));
    }

    #[test]
    fn minute_of_day_uses_correct_formula() {
        assert_eq!(minute_of_day(0, 0), 0);
        assert_eq!(minute_of_day(1, 30), 90);
        assert_eq!(minute_of_day(23, 59), 1439);
    }
}
