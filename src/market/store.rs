use crate::market::reducer::{stock_reducer, StockAction, StockState};
use tokio::sync::watch;

/// Change-notifying cell around [`stock_reducer`].
#[derive(Debug)]
pub struct StockStore {
    state: watch::Sender<StockState>,
}

impl Default for StockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StockStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(StockState::default());
        Self { state }
    }

    /// Runs the reducer and wakes watchers only if the state changed.
    pub fn dispatch(&self, action: StockAction) -> bool {
        self.state.send_if_modified(|current| {
            let next = stock_reducer(current, action);
            if next.same_as(current) {
                return false;
            }
            *current = next;
            true
        })
    }

    pub fn snapshot(&self) -> StockState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<StockState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::{ConnectionStatus, PriceUpdate, StockRecord};
    use chrono::Utc;

    #[test]
    fn dispatch_reports_whether_state_changed() {
        let store = StockStore::new();
        assert!(store.dispatch(StockAction::ApplySnapshot(vec![StockRecord::new(
            "AAPL", "Apple", 150.0
        )])));

        let dropped = store.dispatch(StockAction::ApplyPriceUpdate(PriceUpdate {
            symbol: "TSLA".to_string(),
            price: 1.0,
            timestamp: Utc::now(),
        }));
        assert!(!dropped);
        assert!(store.snapshot().get("TSLA").is_none());
    }

    #[tokio::test]
    async fn watchers_observe_changes_only() {
        let store = StockStore::new();
        let mut receiver = store.watch();

        store.dispatch(StockAction::SetConnectionStatus(ConnectionStatus::Disconnected));
        assert!(!receiver.has_changed().unwrap());

        store.dispatch(StockAction::SetConnectionStatus(ConnectionStatus::Connected));
        assert!(receiver.has_changed().unwrap());
        let state = receiver.borrow_and_update().clone();
        assert_eq!(state.connection_status, ConnectionStatus::Connected);
    }
}
