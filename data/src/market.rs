use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};

/// A trading pair identifier of the canonical form `"STOCK/MONEY"`.
///
/// Always stored in `STOCK/MONEY` orientation. Some upstream event kinds (bancor pools) carry
/// the inverse `MONEY/STOCK` orientation on the wire; callers normalise at the parse boundary
/// rather than letting the inverted form leak into the aggregate managers or the subscription
/// registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Market(SmolStr);

impl Market {
    pub fn new(stock: &str, money: &str) -> Self {
        Self(SmolStr::new(format!("{stock}/{money}")))
    }

    /// Parses a canonical `"STOCK/MONEY"` string.
    pub fn parse(pair: &str) -> Option<Self> {
        let (stock, money) = pair.split_once('/')?;
        if stock.is_empty() || money.is_empty() {
            return None;
        }
        Some(Self::new(stock, money))
    }

    /// Builds a `Market` from the inverted `"MONEY/STOCK"` orientation some upstream payloads use.
    pub fn from_inverted(money_stock: &str) -> Option<Self> {
        let (money, stock) = money_stock.split_once('/')?;
        if stock.is_empty() || money.is_empty() {
            return None;
        }
        Some(Self::new(stock, money))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for Market {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Which side of the order book a quantity delta applies to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Sell,
    Buy,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Sell => Self::Buy,
            Self::Buy => Self::Sell,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_orientation() {
        let market = Market::parse("BTC/USD").unwrap();
        assert_eq!(market.as_str(), "BTC/USD");
    }

    #[test]
    fn normalises_inverted_orientation() {
        let market = Market::from_inverted("USD/BTC").unwrap();
        assert_eq!(market.as_str(), "BTC/USD");
    }
}
