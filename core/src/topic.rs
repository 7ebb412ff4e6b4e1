//! Closed enumeration of subscriber topics, their parameter arity, and the polymorphic per-topic
//! "detail" a subscription carries (a span selector, a depth level selector, or a list of
//! markets).

use crate::error::SubscriptionError;
use hub_data::candle::Span;
use std::fmt;

/// One whitelisted `depth` qualifier (price bucket size), or `"all"` for the unbucketed book.
pub const DEPTH_LEVELS: &[&str] = &[
    "all",
    "0.00000001",
    "0.0000001",
    "0.000001",
    "0.00001",
    "0.0001",
    "0.001",
    "0.01",
    "0.1",
    "1",
    "10",
    "100",
];

/// A subscriber-facing topic, closed per the wire protocol table. Adding an upstream kind never
/// implicitly adds a topic; a new topic requires an explicit variant here.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    BlockInfo,
    Slash,
    Ticker,
    Unbonding,
    Redelegation,
    Locked,
    Unlock,
    Tx,
    Income,
    Order,
    Comment,
    BancorTrade,
    Bancor,
    Deal,
    Kline,
    Depth,
}

impl Topic {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "blockinfo" => Self::BlockInfo,
            "slash" => Self::Slash,
            "ticker" => Self::Ticker,
            "unbonding" => Self::Unbonding,
            "redelegation" => Self::Redelegation,
            "locked" => Self::Locked,
            "unlock" => Self::Unlock,
            "tx" => Self::Tx,
            "income" => Self::Income,
            "order" => Self::Order,
            "comment" => Self::Comment,
            "bancor_trade" => Self::BancorTrade,
            "bancor" => Self::Bancor,
            "deal" => Self::Deal,
            "kline" => Self::Kline,
            "depth" => Self::Depth,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BlockInfo => "blockinfo",
            Self::Slash => "slash",
            Self::Ticker => "ticker",
            Self::Unbonding => "unbonding",
            Self::Redelegation => "redelegation",
            Self::Locked => "locked",
            Self::Unlock => "unlock",
            Self::Tx => "tx",
            Self::Income => "income",
            Self::Order => "order",
            Self::Comment => "comment",
            Self::BancorTrade => "bancor_trade",
            Self::Bancor => "bancor",
            Self::Deal => "deal",
            Self::Kline => "kline",
            Self::Depth => "depth",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The per-(topic, connection) detail surfaced to discovery queries: candlestick subscriptions
/// carry a span selector, depth subscriptions a level selector, ticker subscriptions the list of
/// markets the connection cares about, and everything else carries nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Detail {
    None,
    Span(Span),
    Level(String),
}

/// One validated `"topic"` / `"topic:param"` / `"topic:param:qualifier"` subscribe argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArg {
    pub topic: Topic,
    pub param: Option<String>,
    pub detail: Detail,
}

fn parse_span(qualifier: &str) -> Option<Span> {
    match qualifier {
        "1min" => Some(Span::Minute),
        "1hour" => Some(Span::Hour),
        "1day" => Some(Span::Day),
        _ => None,
    }
}

/// Parses and validates one `arg` entry from a client's `subscribe`/`unsubscribe` command, e.g.
/// `"depth:BTC/USD:0.01"` or `"blockinfo"`.
pub fn parse_arg(arg: &str) -> Result<ParsedArg, SubscriptionError> {
    let mut parts = arg.split(':');
    let topic_name = parts.next().unwrap_or_default();
    let topic = Topic::parse(topic_name).ok_or_else(|| SubscriptionError::UnknownTopic(arg.to_string()))?;
    let rest: Vec<&str> = parts.collect();

    match topic {
        Topic::BlockInfo | Topic::Slash => {
            if !rest.is_empty() {
                return Err(SubscriptionError::BadArity {
                    topic: topic.to_string(),
                    expected: "0",
                    got: rest.len(),
                });
            }
            Ok(ParsedArg {
                topic,
                param: None,
                detail: Detail::None,
            })
        }
        Topic::Ticker
        | Topic::Unbonding
        | Topic::Redelegation
        | Topic::Locked
        | Topic::Unlock
        | Topic::Tx
        | Topic::Income
        | Topic::Order
        | Topic::Comment
        | Topic::BancorTrade
        | Topic::Bancor
        | Topic::Deal => {
            if rest.len() != 1 {
                return Err(SubscriptionError::BadArity {
                    topic: topic.to_string(),
                    expected: "1",
                    got: rest.len(),
                });
            }
            Ok(ParsedArg {
                topic,
                param: Some(rest[0].to_string()),
                detail: Detail::None,
            })
        }
        Topic::Kline => {
            if rest.len() != 2 {
                return Err(SubscriptionError::BadArity {
                    topic: topic.to_string(),
                    expected: "2",
                    got: rest.len(),
                });
            }
            let span = parse_span(rest[1]).ok_or_else(|| SubscriptionError::BadQualifier {
                topic: topic.to_string(),
                qualifier: rest[1].to_string(),
            })?;
            Ok(ParsedArg {
                topic,
                param: Some(rest[0].to_string()),
                detail: Detail::Span(span),
            })
        }
        Topic::Depth => {
            if rest.is_empty() || rest.len() > 2 {
                return Err(SubscriptionError::BadArity {
                    topic: topic.to_string(),
                    expected: "1 or 2",
                    got: rest.len(),
                });
            }
            let level = rest.get(1).copied().unwrap_or("all");
            if !DEPTH_LEVELS.contains(&level) {
                return Err(SubscriptionError::BadQualifier {
                    topic: topic.to_string(),
                    qualifier: level.to_string(),
                });
            }
            Ok(ParsedArg {
                topic,
                param: Some(rest[0].to_string()),
                detail: Detail::Level(level.to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_kline_qualifier() {
        assert!(matches!(
            parse_arg("kline:B/C:5min"),
            Err(SubscriptionError::BadQualifier { .. })
        ));
    }

    #[test]
    fn accepts_known_kline_qualifier() {
        let parsed = parse_arg("kline:B/C:1hour").unwrap();
        assert_eq!(parsed.detail, Detail::Span(Span::Hour));
    }

    #[test]
    fn depth_defaults_to_all_levels() {
        let parsed = parse_arg("depth:B/C").unwrap();
        assert_eq!(parsed.detail, Detail::Level("all".to_string()));
    }

    #[test]
    fn zero_arg_topic_rejects_extra_params() {
        assert!(matches!(
            parse_arg("slash:X"),
            Err(SubscriptionError::BadArity { .. })
        ));
    }
}
