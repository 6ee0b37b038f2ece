use crate::error::AppError;
use crate::market::connection::FeedSession;
use crate::market::ledger::{SubscriptionChange, SubscriptionLedger};
use crate::market::provider::StockProvider;
use crate::market::types::ConnectionStatus;
use crate::state::AppState;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockFeedSession {
    pub url: String,
    pub subscriptions: Vec<String>,
    pub restarted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockFeedStopResult {
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockFeedStatus {
    pub running: bool,
    pub status: ConnectionStatus,
    pub subscriptions: Vec<String>,
}

/// Starts the feed, replacing a running one. Subscriptions carry over.
pub async fn start_stock_feed(state: &AppState) -> Result<StockFeedSession, AppError> {
    let existing = {
        let mut feed_slot = state.stock_feed.lock().await;
        feed_slot.take()
    };

    let restarted = existing.is_some();
    let ledger = match existing {
        Some(provider) => provider.detach().await,
        None => SubscriptionLedger::new(),
    };

    let session = Arc::new(FeedSession::with_ledger(state.config.feed.clone(), ledger));
    let provider = StockProvider::attach(Arc::clone(&state.store), session)?;
    let response = StockFeedSession {
        url: provider.session().config().url.clone(),
        subscriptions: provider.session().ledger().symbols(),
        restarted,
    };

    {
        let mut feed_slot = state.stock_feed.lock().await;
        *feed_slot = Some(provider);
    }

    info!(url = %response.url, restarted, "stock feed started");
    Ok(response)
}

pub async fn stop_stock_feed(state: &AppState) -> Result<StockFeedStopResult, AppError> {
    let existing = {
        let mut feed_slot = state.stock_feed.lock().await;
        feed_slot.take()
    };

    let stopped = if let Some(provider) = existing {
        provider.detach().await;
        true
    } else {
        false
    };

    Ok(StockFeedStopResult { stopped })
}

pub async fn stock_feed_status(state: &AppState) -> StockFeedStatus {
    let feed_slot = state.stock_feed.lock().await;
    StockFeedStatus {
        running: feed_slot.is_some(),
        status: state.store.snapshot().connection_status,
        subscriptions: feed_slot
            .as_ref()
            .map(|provider| provider.session().ledger().symbols())
            .unwrap_or_default(),
    }
}

pub async fn subscribe_symbols(
    state: &AppState,
    symbols: Vec<String>,
) -> Result<SubscriptionChange, AppError> {
    let feed_slot = state.stock_feed.lock().await;
    let provider = feed_slot.as_ref().ok_or(AppError::FeedNotRunning)?;
    provider.subscribe(symbols.as_slice())
}

pub async fn unsubscribe_symbols(
    state: &AppState,
    symbols: Vec<String>,
) -> Result<SubscriptionChange, AppError> {
    let feed_slot = state.stock_feed.lock().await;
    let provider = feed_slot.as_ref().ok_or(AppError::FeedNotRunning)?;
    provider.unsubscribe(symbols.as_slice())
}
