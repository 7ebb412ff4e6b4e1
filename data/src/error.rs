use thiserror::Error;

/// Errors surfaced while decoding or indexing a single upstream event.
///
/// None of these are fatal: the router logs and drops the offending message, per the intake
/// contract (a malformed payload never halts the stream).
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to decode '{kind}' payload: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed order id '{0}', expected 'account-sequence'")]
    MalformedOrderId(String),

    #[error("malformed market pair '{0}', expected 'STOCK/MONEY' or 'MONEY/STOCK'")]
    MalformedMarketPair(String),

    #[error("subject exceeds 255 bytes: {0} bytes")]
    SubjectTooLong(usize),
}
