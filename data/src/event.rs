//! Typed views over upstream event payloads.
//!
//! The router receives each event as opaque JSON bytes; these same types are re-serialised as
//! the persisted record and as the fan-out frame payload, so every field a subscriber or a
//! historical query needs to see has to round-trip, not just the ones the router dispatches on.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightInfo {
    pub height: u64,
    /// Unix seconds this block's events are indexed under.
    pub time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySlash {
    pub validator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub recipient: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyTx {
    pub signers: Vec<String>,
    #[serde(default)]
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationLifecycle {
    pub delegator: String,
    /// Unix seconds at which the unbonding/redelegation completes.
    pub completion_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteDelegation {
    pub delegator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyUnlock {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenComment {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderInfo {
    pub sender: String,
    pub order_id: String,
    pub stock: String,
    pub money: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillOrderInfo {
    /// `"account-sequence"`, split at the router per the upstream convention.
    pub order_id: String,
    pub stock: String,
    pub money: String,
    pub side: OrderSide,
    pub deal_money: Decimal,
    pub deal_stock: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelOrderInfo {
    pub order_id: String,
    pub stock: String,
    pub money: String,
    pub side: OrderSide,
    /// Resting price the cancelled quantity was booked at, needed to know which depth level
    /// `left_stock` should be subtracted from.
    pub price: Decimal,
    pub left_stock: Decimal,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Sell,
    Buy,
}

impl From<OrderSide> for crate::market::Side {
    fn from(value: OrderSide) -> Self {
        match value {
            OrderSide::Sell => crate::market::Side::Sell,
            OrderSide::Buy => crate::market::Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BancorTrade {
    pub sender: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BancorInfo {
    /// Carried in the upstream's `MONEY/STOCK` orientation; the router normalises this to the
    /// canonical `STOCK/MONEY` `Market` before indexing or looking up subscribers.
    pub money_stock_pair: String,
}

/// Splits an `"account-sequence"` order id, as used by `fill_order_info`/`del_order_info`.
pub fn split_order_id(order_id: &str) -> Option<(&str, &str)> {
    order_id.rsplit_once('-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_account_sequence_order_id() {
        assert_eq!(split_order_id("alice-42"), Some(("alice", "42")));
        assert_eq!(split_order_id("malformed"), None);
    }
}
