//! Closed enumeration of indexed event kinds and their persisted kind byte.
//!
//! The source dispatches on a string switch; the redesign keeps this as a closed enum so a new
//! upstream kind requires an explicit match arm rather than silently falling through.

use serde::{Deserialize, Serialize};

/// The single leading byte of every composite key (see the codec module).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Candlestick,
    Deal,
    Order,
    BancorInfo,
    BancorTrade,
    Income,
    Tx,
    Comment,
    Height,
    Detail,
    Redelegation,
    Unbonding,
    Unlock,
}

impl Kind {
    pub const fn byte(self) -> u8 {
        match self {
            Kind::Candlestick => 0x10,
            Kind::Deal => 0x12,
            Kind::Order => 0x14,
            Kind::BancorInfo => 0x16,
            Kind::BancorTrade => 0x18,
            Kind::Income => 0x1A,
            Kind::Tx => 0x1C,
            Kind::Comment => 0x1D,
            Kind::Height => 0x20,
            Kind::Detail => 0x22,
            Kind::Redelegation => 0x30,
            Kind::Unbonding => 0x32,
            Kind::Unlock => 0x34,
        }
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x10 => Kind::Candlestick,
            0x12 => Kind::Deal,
            0x14 => Kind::Order,
            0x16 => Kind::BancorInfo,
            0x18 => Kind::BancorTrade,
            0x1A => Kind::Income,
            0x1C => Kind::Tx,
            0x1D => Kind::Comment,
            0x20 => Kind::Height,
            0x22 => Kind::Detail,
            0x30 => Kind::Redelegation,
            0x32 => Kind::Unbonding,
            0x34 => Kind::Unlock,
            _ => return None,
        })
    }
}

/// Order-event suffix disambiguators, persisted as the trailing byte of an `Order`-kind key and
/// used to pick the `order`-topic frame type to push (`create_order`/`fill_order`/`cancel_order`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSuffix {
    Create,
    Fill,
    Cancel,
}

impl OrderSuffix {
    pub const fn byte(self) -> u8 {
        match self {
            OrderSuffix::Create => 1,
            OrderSuffix::Fill => 2,
            OrderSuffix::Cancel => 3,
        }
    }

    pub const fn frame_type(self) -> &'static str {
        match self {
            OrderSuffix::Create => "create_order",
            OrderSuffix::Fill => "fill_order",
            OrderSuffix::Cancel => "cancel_order",
        }
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            1 => OrderSuffix::Create,
            2 => OrderSuffix::Fill,
            3 => OrderSuffix::Cancel,
            _ => return None,
        })
    }
}

/// Lifecycle-stage suffix for the delegation events (`Redelegation`/`Unbonding` kinds), persisted
/// as the trailing byte of the key the same way [`OrderSuffix`] disambiguates order events.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleSuffix {
    Begin,
    Complete,
}

impl LifecycleSuffix {
    pub const fn byte(self) -> u8 {
        match self {
            LifecycleSuffix::Begin => 1,
            LifecycleSuffix::Complete => 2,
        }
    }
}

/// The kind tag carried on the wire from the upstream transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpstreamKind {
    HeightInfo,
    NotifySlash,
    NotifyTx,
    BeginRedelegation,
    BeginUnbonding,
    CompleteRedelegation,
    CompleteUnbonding,
    NotifyUnlock,
    TokenComment,
    CreateOrderInfo,
    FillOrderInfo,
    DelOrderInfo,
    BancorTrade,
    BancorInfo,
    Commit,
}

impl UpstreamKind {
    /// Parses the transport's wire key string into a closed `UpstreamKind`. Unknown strings are
    /// not an error here: the router logs and drops them, matching the "unknown kind" row of the
    /// dispatch table.
    pub fn parse(wire: &str) -> Option<Self> {
        Some(match wire {
            "height_info" => Self::HeightInfo,
            "notify_slash" => Self::NotifySlash,
            "notify_tx" => Self::NotifyTx,
            "begin_redelegation" => Self::BeginRedelegation,
            "begin_unbonding" => Self::BeginUnbonding,
            "complete_redelegation" => Self::CompleteRedelegation,
            "complete_unbonding" => Self::CompleteUnbonding,
            "notify_unlock" => Self::NotifyUnlock,
            "token_comment" => Self::TokenComment,
            "create_order_info" => Self::CreateOrderInfo,
            "fill_order_info" => Self::FillOrderInfo,
            "del_order_info" => Self::DelOrderInfo,
            "bancor_trade" => Self::BancorTrade,
            "bancor_info" => Self::BancorInfo,
            "commit" => Self::Commit,
            _ => return None,
        })
    }
}
