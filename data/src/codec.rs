//! Time-ordered composite key encoding shared by every indexed event kind.
//!
//! Layout (big-endian, lexicographic order is time order):
//!
//! ```text
//! [kindByte : 1][len(subject) : 1][subject bytes : len][0x00][blockTime : 8][serialId : 8][suffix : 1]
//! ```
//!
//! For a fixed `(kind, subject)` pair, byte-lexicographic order of the full key equals
//! `(blockTime, serialId)` order, which is what makes a plain ordered-iterator key-value engine
//! sufficient for "give me the last N events for this subject" queries.

use crate::{error::DataError, kind::Kind};

const SEPARATOR: u8 = 0x00;
const TAIL_LEN: usize = 8 + 8 + 1;

/// Maximum subject length: the length prefix is a single byte.
pub const MAX_SUBJECT_LEN: usize = 255;

fn prefix(kind: Kind, subject: &[u8]) -> Result<Vec<u8>, DataError> {
    if subject.len() > MAX_SUBJECT_LEN {
        return Err(DataError::SubjectTooLong(subject.len()));
    }
    let mut out = Vec::with_capacity(1 + 1 + subject.len() + 1);
    out.push(kind.byte());
    out.push(subject.len() as u8);
    out.extend_from_slice(subject);
    out.push(SEPARATOR);
    Ok(out)
}

/// Encodes a full key for a persisted record.
pub fn encode(
    kind: Kind,
    subject: &[u8],
    suffix: u8,
    block_time: u64,
    serial_id: u64,
) -> Result<Vec<u8>, DataError> {
    let mut out = prefix(kind, subject)?;
    out.extend_from_slice(&block_time.to_be_bytes());
    out.extend_from_slice(&serial_id.to_be_bytes());
    out.push(suffix);
    Ok(out)
}

/// The inclusive lower bound of a `(kind, subject)` range: the bare prefix.
pub fn start_key(kind: Kind, subject: &[u8]) -> Result<Vec<u8>, DataError> {
    prefix(kind, subject)
}

/// The exclusive upper bound of a reverse scan over `(kind, subject)` bounded above by
/// `(upper_time, upper_serial_id)`.
pub fn end_key(
    kind: Kind,
    subject: &[u8],
    upper_time: u64,
    upper_serial_id: u64,
) -> Result<Vec<u8>, DataError> {
    let mut out = prefix(kind, subject)?;
    out.extend_from_slice(&upper_time.to_be_bytes());
    out.extend_from_slice(&upper_serial_id.to_be_bytes());
    Ok(out)
}

/// Builds the key for one `Detail` record: a shared payload blob that a `Tx` or `Income` key
/// points to by serial id, rather than duplicating the payload once per signer/recipient.
/// Little-endian, unlike every time-ordered key: `Detail` rows are never range-scanned, only
/// point-looked-up by the exact serial id a pointer carries, so sort order is irrelevant.
pub fn detail_key(serial_id: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.push(Kind::Detail.byte());
    out.extend_from_slice(&serial_id.to_le_bytes());
    out
}

/// Builds the key for one block height record, indexed by height rather than by time so the
/// resume offset after a crash can be recovered with a single point lookup.
pub fn height_key(height: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.push(Kind::Height.byte());
    out.extend_from_slice(&height.to_be_bytes());
    out
}

/// Extracts `(blockTime, serialId, suffix)` from the trailing 17 bytes of an encoded key.
pub fn decode_tail(key: &[u8]) -> Option<(u64, u64, u8)> {
    if key.len() < TAIL_LEN {
        return None;
    }
    let tail = &key[key.len() - TAIL_LEN..];
    let block_time = u64::from_be_bytes(tail[0..8].try_into().ok()?);
    let serial_id = u64::from_be_bytes(tail[8..16].try_into().ok()?);
    let suffix = tail[16];
    Some((block_time, serial_id, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_order_matches_time_order() {
        let a = encode(Kind::Deal, b"BTC/USD", 0, 100, 1).unwrap();
        let b = encode(Kind::Deal, b"BTC/USD", 0, 100, 2).unwrap();
        let c = encode(Kind::Deal, b"BTC/USD", 101, 0, 0).unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn end_key_is_exclusive_upper_bound_of_same_pair() {
        let at_bound = encode(Kind::Deal, b"BTC/USD", 0, 100, 5).unwrap();
        let end = end_key(Kind::Deal, b"BTC/USD", 100, 5).unwrap();
        assert_eq!(at_bound[..end.len()], end[..]);
        assert_eq!(at_bound.len(), end.len() + 1);
    }

    #[test]
    fn distinct_subjects_do_not_interleave() {
        let a = start_key(Kind::Deal, b"BTC/USD").unwrap();
        let b = start_key(Kind::Deal, b"ETH/USD").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_oversized_subject() {
        let subject = vec![0u8; MAX_SUBJECT_LEN + 1];
        assert!(matches!(
            start_key(Kind::Deal, &subject),
            Err(DataError::SubjectTooLong(_))
        ));
    }

    #[test]
    fn decode_tail_roundtrips() {
        let key = encode(Kind::Order, b"alice", 3, 555, 42).unwrap();
        let (time, serial, suffix) = decode_tail(&key).unwrap();
        assert_eq!((time, serial, suffix), (555, 42, 3));
    }

    #[test]
    fn detail_key_is_distinct_per_serial() {
        assert_ne!(detail_key(1), detail_key(2));
        assert_eq!(detail_key(1)[0], Kind::Detail.byte());
    }

    #[test]
    fn height_key_is_big_endian_ordered() {
        assert!(height_key(1) < height_key(2));
        assert_eq!(height_key(1).len(), 9);
    }
}
