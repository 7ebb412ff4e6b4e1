//! # Historical queries
//!
//! Every subject-keyed historical query — the client-facing `"topic:subject"` replay on
//! subscribe, and the router's own delegation-completion lookup — bottoms out in one bounded
//! reverse scan over the time-ordered composite key range `hub_data::codec` defines. `Tx` and
//! `Income` are special-cased: what's stored under those keys is a pointer (a `Detail` serial id),
//! not the full payload, so a query against them does one extra point lookup per row to
//! dereference it.

use hub_core::{error::StoreError, store::KeyValueStore};
use hub_data::{codec, kind::Kind};

/// One historical row: the decoded payload, its time-ordering tail, and the suffix byte that
/// disambiguates records sharing the same `(kind, subject, blockTime, serialId)` otherwise never
/// collide on (order create/fill/cancel; candlestick span).
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub value: Vec<u8>,
    pub block_time: u64,
    pub serial_id: u64,
    pub suffix: u8,
}

/// Runs the client-facing historical query for `kind`/`subject`, returning at most
/// `count.min(cap)` rows strictly older than `(upper_time, upper_serial_id)`, newest first.
///
/// `Tx` and `Income` rows are dereferenced through their `Detail` pointer before being returned,
/// so the caller always sees the full payload regardless of kind.
pub fn query<S: KeyValueStore>(
    store: &S,
    kind: Kind,
    subject: &[u8],
    upper_time: u64,
    upper_serial_id: u64,
    count: usize,
    cap: usize,
) -> Result<Vec<HistoryRow>, StoreError> {
    let count = count.min(cap);
    let start = codec::start_key(kind, subject)?;
    let end = codec::end_key(kind, subject, upper_time, upper_serial_id)?;
    let rows = store.reverse_scan(&start, &end, count)?;

    let mut out = Vec::with_capacity(rows.len());
    for (key, value) in rows {
        let Some((block_time, serial_id, suffix)) = codec::decode_tail(&key) else {
            continue;
        };
        let value = if matches!(kind, Kind::Tx | Kind::Income) {
            match dereference_pointer(store, &value)? {
                Some(full) => full,
                None => continue,
            }
        } else {
            value
        };
        out.push(HistoryRow { value, block_time, serial_id, suffix });
    }
    Ok(out)
}

fn dereference_pointer<S: KeyValueStore>(store: &S, pointer: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
    let Ok(bytes) = <[u8; 8]>::try_from(pointer) else {
        return Ok(None);
    };
    let serial_id = u64::from_be_bytes(bytes);
    store.get(&codec::detail_key(serial_id))
}

/// Reverse-scans `kind`/`subject` for every row whose time component falls in
/// `(lower_exclusive, upper_inclusive]`, used by `complete_redelegation`/`complete_unbonding` to
/// find the matching `begin_*` record (persisted under the completion timestamp as its key time,
/// see the router). `upper_inclusive` is the current block time, so `end_key(..., upper_inclusive,
/// u64::MAX)` is an exclusive bound one past every record keyed at that exact block time.
pub fn scan_completion_window<S: KeyValueStore>(
    store: &S,
    kind: Kind,
    subject: &[u8],
    lower_exclusive: u64,
    upper_inclusive: u64,
    cap: usize,
) -> Result<Vec<Vec<u8>>, StoreError> {
    let start = codec::start_key(kind, subject)?;
    let end = codec::end_key(kind, subject, upper_inclusive, u64::MAX)?;
    let rows = store.reverse_scan(&start, &end, cap)?;

    let mut out = Vec::new();
    for (key, value) in rows {
        let Some((block_time, _, _)) = codec::decode_tail(&key) else {
            continue;
        };
        if block_time <= lower_exclusive {
            break;
        }
        out.push(value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::store::{Batch, MemoryStore};

    #[test]
    fn query_caps_count_at_configured_max() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        for serial in 0..5u64 {
            let key = codec::encode(Kind::Deal, b"BTC/USD", 0, 100, serial).unwrap();
            batch.set(key, vec![serial as u8]);
        }
        store.write_sync(batch).unwrap();

        let rows = query(&store, Kind::Deal, b"BTC/USD", u64::MAX, u64::MAX, 100, 2).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn query_dereferences_tx_pointer_to_full_payload() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        batch.set(codec::detail_key(7), b"the full tx payload".to_vec());
        batch.set(
            codec::encode(Kind::Tx, b"alice", 0, 100, 0).unwrap(),
            7u64.to_be_bytes().to_vec(),
        );
        store.write_sync(batch).unwrap();

        let rows = query(&store, Kind::Tx, b"alice", u64::MAX, u64::MAX, 10, 1024).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, b"the full tx payload");
    }

    #[test]
    fn completion_window_excludes_boundary_and_earlier() {
        let store = MemoryStore::new();
        let mut batch = Batch::new();
        batch.set(
            codec::encode(Kind::Unbonding, b"alice", 1, 150, 0).unwrap(),
            b"at-150".to_vec(),
        );
        batch.set(
            codec::encode(Kind::Unbonding, b"alice", 1, 90, 1).unwrap(),
            b"at-90".to_vec(),
        );
        store.write_sync(batch).unwrap();

        let found = scan_completion_window(&store, Kind::Unbonding, b"alice", 100, 150, 1024).unwrap();
        assert_eq!(found, vec![b"at-150".to_vec()]);
    }
}
