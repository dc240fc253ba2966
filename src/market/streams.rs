//! Subscription topics.

use crate::market::timeframe::Timeframe;

/// Represents the tables that can be subscribed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Instrument,
    Trade,
    Quote,
    /// Full-depth order book
    OrderBookL2,
    /// Top 10 levels only
    OrderBook10,
    /// OHLCV bins of the given size
    TradeBin(Timeframe),

    // Private, need credentials
    Execution,
    Order,
    Position,
    /// Account-wide, not scoped to a symbol
    Margin,

    /// Anything else the feed offers, by table name.
    Other { name: String, symbol_scoped: bool },
}

impl Topic {
    /// Symbol-scoped topics subscribed on connect, in addition to `Margin`.
    pub const DEFAULT_SYMBOL_TOPICS: [Topic; 7] = [
        Topic::Execution,
        Topic::Instrument,
        Topic::Order,
        Topic::OrderBookL2,
        Topic::Position,
        Topic::Quote,
        Topic::Trade,
    ];

    pub fn other(name: impl Into<String>) -> Self {
        Self::Other {
            name: name.into(),
            symbol_scoped: true,
        }
    }

    /// Table name on the wire.
    pub fn name(&self) -> String {
        match self {
            Topic::Instrument => "instrument".into(),
            Topic::Trade => "trade".into(),
            Topic::Quote => "quote".into(),
            Topic::OrderBookL2 => "orderBookL2".into(),
            Topic::OrderBook10 => "orderBook10".into(),
            Topic::TradeBin(tf) => tf.bin_table(),
            Topic::Execution => "execution".into(),
            Topic::Order => "order".into(),
            Topic::Position => "position".into(),
            Topic::Margin => "margin".into(),
            Topic::Other { name, .. } => name.clone(),
        }
    }

    pub fn is_symbol_scoped(&self) -> bool {
        match self {
            Topic::Margin => false,
            Topic::Other { symbol_scoped, .. } => *symbol_scoped,
            _ => true,
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Topic::Execution | Topic::Order | Topic::Position | Topic::Margin
        )
    }

    /// `name:SYMBOL` for symbol-scoped topics, bare `name` otherwise.
    pub fn scoped(&self, symbol: &str) -> String {
        if self.is_symbol_scoped() {
            format!("{}:{}", self.name(), symbol)
        } else {
            self.name()
        }
    }

    /// The topics requested in the connection URL.
    pub fn defaults() -> Vec<Topic> {
        let mut topics = Topic::DEFAULT_SYMBOL_TOPICS.to_vec();
        topics.push(Topic::Margin);
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoping() {
        assert_eq!(Topic::Trade.scoped("XBTUSD"), "trade:XBTUSD");
        assert_eq!(Topic::TradeBin(Timeframe::H1).scoped("XBTUSD"), "tradeBin1h:XBTUSD");
        assert_eq!(Topic::Margin.scoped("XBTUSD"), "margin");
        assert_eq!(Topic::other("liquidation").scoped("ETHUSD"), "liquidation:ETHUSD");
    }

    #[test]
    fn test_defaults() {
        let defaults = Topic::defaults();
        assert_eq!(defaults.len(), 8);
        assert_eq!(defaults.last(), Some(&Topic::Margin));
        assert!(defaults.contains(&Topic::OrderBookL2));
    }

    #[test]
    fn test_requires_auth() {
        assert!(Topic::Order.requires_auth());
        assert!(Topic::Margin.requires_auth());
        assert!(!Topic::Quote.requires_auth());
    }
}
