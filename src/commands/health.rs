use crate::market::reducer::StockState;
use crate::market::types::ConnectionStatus;
use crate::state::AppState;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
    pub feed: ConnectionStatus,
    pub stocks: usize,
}

pub fn build_health_response(started_at: Instant, snapshot: &StockState) -> HealthResponse {
    let status = match snapshot.connection_status {
        ConnectionStatus::Connected => "ok",
        _ => "degraded",
    };

    HealthResponse {
        status,
        uptime_ms: started_at.elapsed().as_millis(),
        feed: snapshot.connection_status,
        stocks: snapshot.len(),
    }
}

pub fn health(state: &AppState) -> HealthResponse {
    build_health_response(state.started_at, &state.store.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::reducer::{stock_reducer, StockAction};
    use crate::market::types::StockRecord;

    #[test]
    fn health_reports_feed_status_and_stock_count() {
        let snapshot = stock_reducer(
            &StockState::default(),
            StockAction::ApplySnapshot(vec![StockRecord::new("AAPL", "Apple", 150.0)]),
        );

        let response = build_health_response(Instant::now(), &snapshot);
        assert_eq!(response.status, "degraded");
        assert_eq!(response.feed, ConnectionStatus::Disconnected);
        assert_eq!(response.stocks, 1);
        assert!(response.uptime_ms <= 1_000);

        let connected = stock_reducer(
            &snapshot,
            StockAction::SetConnectionStatus(ConnectionStatus::Connected),
        );
        assert_eq!(build_health_response(Instant::now(), &connected).status, "ok");
    }
}
