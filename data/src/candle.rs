//! Per-market candlestick aggregation across the minute/hour/day spans.

use crate::market::Market;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A candlestick timespan. Ordering here (`Minute < Hour < Day`) is the emission order within a
/// market at `newBlock`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Span {
    Minute,
    Hour,
    Day,
}

impl Span {
    pub const ALL: [Span; 3] = [Span::Minute, Span::Hour, Span::Day];

    pub const fn seconds(self) -> u64 {
        match self {
            Span::Minute => 60,
            Span::Hour => 3_600,
            Span::Day => 86_400,
        }
    }

    fn align(self, block_time: u64) -> u64 {
        (block_time / self.seconds()) * self.seconds()
    }
}

/// In-progress or completed candlestick bar for one market/span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleRecord {
    pub market: Market,
    pub span: Span,
    pub begin: u64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone)]
struct InProgress {
    begin: u64,
    ticked: bool,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

impl InProgress {
    fn seeded(begin: u64, open: Decimal) -> Self {
        Self {
            begin,
            ticked: false,
            open,
            high: open,
            low: open,
            close: open,
            volume: Decimal::ZERO,
        }
    }

    fn empty(begin: u64) -> Self {
        Self::seeded(begin, Decimal::ZERO)
    }

    fn tick(&mut self, price: Decimal, volume: Decimal) {
        if !self.ticked {
            self.open = price;
            self.high = price;
            self.low = price;
            self.ticked = true;
        } else {
            self.high = self.high.max(price);
            self.low = self.low.min(price);
        }
        self.close = price;
        self.volume += volume;
    }

    fn snapshot(&self, market: &Market, span: Span) -> CandleRecord {
        CandleRecord {
            market: market.clone(),
            span,
            begin: self.begin,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Owns the three in-progress candlestick records (minute/hour/day) for every known market.
#[derive(Debug, Default)]
pub struct CandlestickManager {
    markets: IndexMap<Market, [InProgress; 3]>,
}

impl CandlestickManager {
    pub fn new() -> Self {
        Self {
            markets: IndexMap::new(),
        }
    }

    /// Initialises three empty records for `market` if not already tracked, each begin-aligned to
    /// `block_time` so a market first seen mid-block doesn't emit an epoch-dated bar at the next
    /// boundary crossing.
    pub fn add_market(&mut self, market: &Market, block_time: u64) {
        self.markets.entry(market.clone()).or_insert_with(|| {
            std::array::from_fn(|i| InProgress::empty(Span::ALL[i].align(block_time)))
        });
    }

    fn span_slot(span: Span) -> usize {
        Span::ALL.iter().position(|s| *s == span).unwrap()
    }

    /// Updates every in-progress record for `market` with one trade tick.
    pub fn update(&mut self, market: &Market, block_time: u64, price: Decimal, volume: Decimal) {
        self.add_market(market, block_time);
        let records = self.markets.get_mut(market).expect("just inserted above");
        for record in records.iter_mut() {
            record.tick(price, volume);
        }
    }

    /// Accessor used by the router on a fill event to read the current minute bar's price.
    pub fn get_record(&self, market: &Market, span: Span) -> Option<CandleRecord> {
        self.markets
            .get(market)
            .map(|records| records[Self::span_slot(span)].snapshot(market, span))
    }

    /// Crosses `block_time` over every market's span boundaries, emitting completed bars and
    /// seeding the next record with `open = close` of the one just completed. Markets with no
    /// ticks since the last boundary are reseeded silently (no emission) rather than publishing
    /// an empty bar. Output is ordered by (market insertion order, ascending span).
    pub fn new_block(&mut self, block_time: u64) -> Vec<CandleRecord> {
        let mut completed = Vec::new();
        for (market, records) in self.markets.iter_mut() {
            for span in Span::ALL {
                let record = &mut records[Self::span_slot(span)];
                let crossed = (block_time / span.seconds()) > (record.begin / span.seconds());
                if !crossed {
                    continue;
                }
                let new_begin = span.align(block_time);
                if record.ticked {
                    completed.push(record.snapshot(market, span));
                    *record = InProgress::seeded(new_begin, record.close);
                } else {
                    record.begin = new_begin;
                }
            }
        }
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn open_seeds_from_previous_close_across_boundary() {
        let market = Market::parse("BTC/USD").unwrap();
        let mut mgr = CandlestickManager::new();
        mgr.add_market(&market, 0);

        mgr.update(&market, 0, dec!(10), dec!(1));
        mgr.new_block(30); // inside the first minute, no boundary crossed yet
        mgr.update(&market, 30, dec!(12), dec!(1));

        let completed = mgr.new_block(61); // crosses the minute boundary
        let minute = completed
            .iter()
            .find(|c| c.span == Span::Minute)
            .expect("minute bar should have completed");
        assert_eq!(minute.open, dec!(10));
        assert_eq!(minute.close, dec!(12));
        assert_eq!(minute.high, dec!(12));
        assert_eq!(minute.low, dec!(10));
        assert_eq!(minute.volume, dec!(2));

        let next = mgr.get_record(&market, Span::Minute).unwrap();
        assert_eq!(next.open, dec!(12));
    }

    #[test]
    fn market_seen_mid_block_aligns_begin_to_the_current_span_not_epoch() {
        let market = Market::parse("BTC/USD").unwrap();
        let mut mgr = CandlestickManager::new();
        mgr.update(&market, 75, dec!(10), dec!(1)); // market first seen 15s into minute 1

        let completed = mgr.new_block(120); // crosses the minute boundary
        let minute = completed
            .iter()
            .find(|c| c.span == Span::Minute)
            .expect("minute bar should have completed");
        assert_eq!(minute.begin, 60);
    }

    #[test]
    fn quiet_market_does_not_emit_empty_bar() {
        let market = Market::parse("BTC/USD").unwrap();
        let mut mgr = CandlestickManager::new();
        mgr.add_market(&market, 0);
        let completed = mgr.new_block(3_700);
        assert!(completed.is_empty());
    }

    #[test]
    fn emission_order_is_market_then_ascending_span() {
        let a = Market::parse("AAA/USD").unwrap();
        let b = Market::parse("BBB/USD").unwrap();
        let mut mgr = CandlestickManager::new();
        mgr.add_market(&a, 0);
        mgr.add_market(&b, 0);
        mgr.update(&a, 0, dec!(1), dec!(1));
        mgr.update(&b, 0, dec!(1), dec!(1));

        let completed = mgr.new_block(90_000); // crosses minute, hour and day for both markets
        let pairs: Vec<(&str, Span)> = completed
            .iter()
            .map(|c| (c.market.as_str(), c.span))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("AAA/USD", Span::Minute),
                ("AAA/USD", Span::Hour),
                ("AAA/USD", Span::Day),
                ("BBB/USD", Span::Minute),
                ("BBB/USD", Span::Hour),
                ("BBB/USD", Span::Day),
            ]
        );
    }
}
