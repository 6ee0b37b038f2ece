use crate::market::types::OutboundFrame;
use serde::Serialize;
use std::collections::BTreeSet;

/// Symbols the client wants pushed updates for.
///
/// The server forgets subscriptions whenever the physical connection drops, so
/// this set is the source of truth and is replayed on every open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionLedger {
    symbols: BTreeSet<String>,
}

impl SubscriptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    /// Adds symbols and returns the ones that were not already present.
    pub fn subscribe(&mut self, symbols: Vec<String>) -> Vec<String> {
        let mut added = Vec::new();
        for symbol in symbols {
            if self.symbols.insert(symbol.clone()) {
                added.push(symbol);
            }
        }
        added
    }

    /// Removes symbols and returns the ones that were present.
    pub fn unsubscribe(&mut self, symbols: Vec<String>) -> Vec<String> {
        symbols
            .into_iter()
            .filter(|symbol| self.symbols.remove(symbol))
            .collect()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.symbols.iter().cloned().collect()
    }

    pub fn replay_frame(&self) -> Option<OutboundFrame> {
        if self.symbols.is_empty() {
            return None;
        }
        Some(OutboundFrame::Subscribe {
            symbols: self.symbols(),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Sent,
    Deferred,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionChange {
    pub changed: Vec<String>,
    pub delivery: Delivery,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn repeated_subscribe_is_idempotent() {
        let mut once = SubscriptionLedger::new();
        once.subscribe(symbols(&["AAPL"]));

        let mut twice = SubscriptionLedger::new();
        let first = twice.subscribe(symbols(&["AAPL"]));
        let second = twice.subscribe(symbols(&["AAPL"]));

        assert_eq!(once, twice);
        assert_eq!(first, symbols(&["AAPL"]));
        assert!(second.is_empty());
    }

    #[test]
    fn subscribe_reports_only_new_symbols() {
        let mut ledger = SubscriptionLedger::with_symbols(["AAPL"]);
        let added = ledger.subscribe(symbols(&["AAPL", "MSFT", "MSFT"]));

        assert_eq!(added, symbols(&["MSFT"]));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn unsubscribe_of_absent_symbol_is_noop() {
        let mut ledger = SubscriptionLedger::with_symbols(["AAPL"]);
        let removed = ledger.unsubscribe(symbols(&["TSLA"]));

        assert!(removed.is_empty());
        assert!(ledger.contains("AAPL"));
    }

    #[test]
    fn unsubscribe_removes_without_reference_counting() {
        let mut ledger = SubscriptionLedger::new();
        ledger.subscribe(symbols(&["AAPL"]));
        ledger.subscribe(symbols(&["AAPL"]));
        let removed = ledger.unsubscribe(symbols(&["AAPL"]));

        assert_eq!(removed, symbols(&["AAPL"]));
        assert!(ledger.is_empty());
    }

    #[test]
    fn replay_frame_carries_full_set() {
        assert_eq!(SubscriptionLedger::new().replay_frame(), None);

        let ledger = SubscriptionLedger::with_symbols(["GOOGL", "AAPL"]);
        assert_eq!(
            ledger.replay_frame(),
            Some(OutboundFrame::Subscribe {
                symbols: symbols(&["AAPL", "GOOGL"]),
            })
        );
    }
}
