//! # Subscription registry
//!
//! Topic⇄connection graph, under a single `parking_lot` read/write lock. The registry exclusively
//! owns this graph; connections themselves are shared with the delivery step, which holds a
//! cloned handle only for the duration of one write.
//!
//! Discovery queries copy the matching `(handle, detail)` pairs into a local `Vec` under the read
//! lock and release it before any network write happens, so a push cycle always observes a
//! consistent snapshot even though connections can subscribe/unsubscribe/close concurrently.
//!
//! Generic over the connection handle type so it can be exercised in tests with a plain `Clone`
//! value instead of a live websocket; `hub`'s server wiring instantiates it with
//! [`ConnectionHandle`](hub_integration::protocol::ConnectionHandle).

use crate::{
    error::SubscriptionError,
    topic::{Detail, ParsedArg, Topic},
};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use std::{
    collections::HashSet,
    sync::atomic::{AtomicU64, Ordering},
};

/// Opaque identifier for one accepted subscriber connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

/// One subscribed parameter tuple: the subject (market/address/token, or absent for a 0-arg
/// topic) and the per-subscription detail (span/level selector, or none).
type ParamTuple = (Option<String>, Detail);

struct Inner<H> {
    conns: FnvHashMap<ConnId, H>,
    // topic -> connection -> subscribed parameter tuples for that topic
    subs: FnvHashMap<Topic, FnvHashMap<ConnId, HashSet<ParamTuple>>>,
}

impl<H> Default for Inner<H> {
    fn default() -> Self {
        Self {
            conns: FnvHashMap::default(),
            subs: FnvHashMap::default(),
        }
    }
}

/// Thread-safe topic⇄connection subscription graph, generic over the connection handle type `H`.
pub struct SubscriptionRegistry<H> {
    inner: RwLock<Inner<H>>,
    next_id: AtomicU64,
}

impl<H> Default for SubscriptionRegistry<H> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<H> std::fmt::Debug for SubscriptionRegistry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry").finish_non_exhaustive()
    }
}

impl<H: Clone> SubscriptionRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly accepted connection with an empty topic set, returning its id.
    pub fn add_conn(&self, handle: H) -> ConnId {
        let id = ConnId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.write().conns.insert(id, handle);
        id
    }

    /// Removes `id` from every topic it is subscribed to and forgets its handle. Idempotent
    /// against a connection already absent from the registry; returns the handle so the caller
    /// can close the underlying transport.
    pub fn remove_conn(&self, id: ConnId) -> Option<H> {
        let mut inner = self.inner.write();
        for conns in inner.subs.values_mut() {
            conns.remove(&id);
        }
        inner.conns.remove(&id)
    }

    /// Validates and records one subscribe argument for `id`. A no-op if `id` is unknown (the
    /// connection has already been closed by a racing delivery failure).
    pub fn subscribe(&self, id: ConnId, parsed: ParsedArg) -> Result<(), SubscriptionError> {
        let mut inner = self.inner.write();
        if !inner.conns.contains_key(&id) {
            return Ok(());
        }
        inner
            .subs
            .entry(parsed.topic)
            .or_default()
            .entry(id)
            .or_default()
            .insert((parsed.param, parsed.detail));
        Ok(())
    }

    /// Removes one parameter tuple for `id` under `parsed.topic`. If no tuples remain for that
    /// topic on that connection, `id` is dropped from the topic's index entirely (the invariant
    /// that a connection appears in a topic's index iff it holds at least one tuple for it).
    pub fn unsubscribe(&self, id: ConnId, parsed: ParsedArg) {
        let mut inner = self.inner.write();
        if let Some(conns) = inner.subs.get_mut(&parsed.topic) {
            if let Some(tuples) = conns.get_mut(&id) {
                tuples.remove(&(parsed.param, parsed.detail));
                if tuples.is_empty() {
                    conns.remove(&id);
                }
            }
        }
    }

    /// Returns the `(id, handle, detail)` triples subscribed to `topic` for `subject` (or every
    /// subscriber of a 0-arg topic when `subject` is `None`). The id is surfaced so the delivery
    /// step can evict a connection that fails a write without a second lookup.
    pub fn subscribers(&self, topic: Topic, subject: Option<&str>) -> Vec<(ConnId, H, Detail)> {
        let inner = self.inner.read();
        let Some(conns) = inner.subs.get(&topic) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (id, tuples) in conns {
            for (param, detail) in tuples {
                let matches = match (subject, param) {
                    (None, _) => true,
                    (Some(subject), Some(param)) => param == subject,
                    (Some(_), None) => false,
                };
                if matches {
                    if let Some(handle) = inner.conns.get(id) {
                        out.push((*id, handle.clone(), detail.clone()));
                    }
                }
            }
        }
        out
    }

    /// Every connection subscribed to [`Topic::Ticker`], paired with the full set of markets it
    /// is subscribed to (a connection may issue several `ticker:<market>` subscriptions).
    pub fn ticker_subscriptions(&self) -> Vec<(ConnId, H, HashSet<String>)> {
        let inner = self.inner.read();
        let Some(conns) = inner.subs.get(&Topic::Ticker) else {
            return Vec::new();
        };
        conns
            .iter()
            .filter_map(|(id, tuples)| {
                let handle = inner.conns.get(id)?;
                let markets: HashSet<String> =
                    tuples.iter().filter_map(|(p, _)| p.clone()).collect();
                Some((*id, handle.clone(), markets))
            })
            .collect()
    }

    pub fn conn_count(&self) -> usize {
        self.inner.read().conns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::parse_arg;

    #[test]
    fn subscribe_then_query_returns_detail() {
        let registry: SubscriptionRegistry<&'static str> = SubscriptionRegistry::new();
        let id = registry.add_conn("conn-a");
        let parsed = parse_arg("kline:B/C:1hour").unwrap();
        registry.subscribe(id, parsed).unwrap();

        let subs = registry.subscribers(Topic::Kline, Some("B/C"));
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].1, "conn-a");
        assert_eq!(subs[0].2, Detail::Span(hub_data::candle::Span::Hour));
    }

    #[test]
    fn unsubscribe_removes_connection_once_empty() {
        let registry: SubscriptionRegistry<&'static str> = SubscriptionRegistry::new();
        let id = registry.add_conn("conn-a");
        let parsed = parse_arg("comment:TOKEN").unwrap();
        registry.subscribe(id, parsed.clone()).unwrap();
        assert_eq!(registry.subscribers(Topic::Comment, Some("TOKEN")).len(), 1);

        registry.unsubscribe(id, parsed);
        assert_eq!(registry.subscribers(Topic::Comment, Some("TOKEN")).len(), 0);
    }

    #[test]
    fn closing_one_connection_does_not_affect_another() {
        let registry: SubscriptionRegistry<&'static str> = SubscriptionRegistry::new();
        let a = registry.add_conn("conn-a");
        let b = registry.add_conn("conn-b");
        registry.subscribe(a, parse_arg("comment:TOKEN").unwrap()).unwrap();
        registry.subscribe(b, parse_arg("comment:TOKEN").unwrap()).unwrap();

        registry.remove_conn(a);

        let subs = registry.subscribers(Topic::Comment, Some("TOKEN"));
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].1, "conn-b");
        assert_eq!(subs[0].2, Detail::None);
    }

    #[test]
    fn ticker_subscriptions_aggregate_markets_per_connection() {
        let registry: SubscriptionRegistry<&'static str> = SubscriptionRegistry::new();
        let id = registry.add_conn("conn-a");
        registry.subscribe(id, parse_arg("ticker:BTC/USD").unwrap()).unwrap();
        registry.subscribe(id, parse_arg("ticker:ETH/USD").unwrap()).unwrap();

        let subs = registry.ticker_subscriptions();
        assert_eq!(subs.len(), 1);
        let (_id, handle, markets) = &subs[0];
        assert_eq!(*handle, "conn-a");
        assert!(markets.contains("BTC/USD"));
        assert!(markets.contains("ETH/USD"));
    }
}
