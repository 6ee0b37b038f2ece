use crate::error::AppError;
use crate::market::api::fetch_stock_list;
use crate::market::connection::{FeedFrame, FeedSession};
use crate::market::ledger::{SubscriptionChange, SubscriptionLedger};
use crate::market::reducer::StockAction;
use crate::market::store::StockStore;
use crate::market::types::{
    normalize_symbol, parse_price_update, ConnectionStatus, StockRecord,
};
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum LoadState {
    Idle,
    Loading,
    Ready { count: usize },
    Stale { reason: String },
    Failed { reason: String, retryable: bool },
}

impl LoadState {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

struct StatusBridge {
    cancellation_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

/// Wires a [`FeedSession`] into a [`StockStore`].
///
/// Push frames become `ApplyPriceUpdate` actions and session status changes
/// become `SetConnectionStatus` actions for as long as the provider is attached.
pub struct StockProvider {
    store: Arc<StockStore>,
    session: Arc<FeedSession>,
    bridge: Option<StatusBridge>,
}

impl StockProvider {
    pub fn attach(store: Arc<StockStore>, session: Arc<FeedSession>) -> Result<Self, AppError> {
        let handler_store = Arc::clone(&store);
        session.register_handler(move |frame: FeedFrame| {
            apply_push_frame(&handler_store, frame);
        });

        let bridge = spawn_status_bridge(Arc::clone(&store), &session);
        if let Err(error) = session.connect() {
            bridge.cancellation_token.cancel();
            session.clear_handler();
            return Err(error);
        }

        Ok(Self {
            store,
            session,
            bridge: Some(bridge),
        })
    }

    pub fn store(&self) -> &Arc<StockStore> {
        &self.store
    }

    pub fn session(&self) -> &Arc<FeedSession> {
        &self.session
    }

    pub fn subscribe<S: AsRef<str>>(&self, symbols: &[S]) -> Result<SubscriptionChange, AppError> {
        self.session.subscribe(symbols)
    }

    pub fn unsubscribe<S: AsRef<str>>(
        &self,
        symbols: &[S],
    ) -> Result<SubscriptionChange, AppError> {
        self.session.unsubscribe(symbols)
    }

    pub fn set_initial_stocks(&self, stocks: Vec<StockRecord>) -> bool {
        self.store.dispatch(StockAction::ApplySnapshot(stocks))
    }

    /// Fetches the stock list, merges it and subscribes every listed symbol
    /// the feed accepts. Listed symbols outside the subscribe alphabet are
    /// still shown, just not streamed.
    ///
    /// A failed fetch only fails the load when nothing is cached; otherwise
    /// the cached view is kept and reported as stale.
    pub async fn load_stocks(&self, client: &Client, api_base_url: &str) -> LoadState {
        match fetch_stock_list(client, api_base_url).await {
            Ok(items) => {
                let symbols: Vec<String> = items
                    .iter()
                    .filter_map(|item| match normalize_symbol(&item.symbol) {
                        Ok(symbol) => Some(symbol),
                        Err(error) => {
                            warn!(symbol = %item.symbol, %error, "listed symbol not streamable");
                            None
                        }
                    })
                    .collect();
                self.set_initial_stocks(items.into_iter().map(StockRecord::from).collect());

                match self.session.subscribe(symbols.as_slice()) {
                    Ok(change) => debug!(added = change.changed.len(), delivery = ?change.delivery, "subscribed listed stocks"),
                    Err(error) => warn!(%error, "failed to subscribe listed stocks"),
                }

                let count = self.store.snapshot().len();
                info!(count, "stocks loaded");
                LoadState::Ready { count }
            }
            Err(error) => {
                let reason = error.to_string();
                if self.store.snapshot().is_empty() {
                    warn!(%error, "stock list unavailable");
                    LoadState::Failed {
                        reason,
                        retryable: true,
                    }
                } else {
                    warn!(%error, "stock list refresh failed, keeping cached stocks");
                    LoadState::Stale { reason }
                }
            }
        }
    }

    /// Tears the session down and returns its ledger for a later session.
    pub async fn detach(mut self) -> SubscriptionLedger {
        self.session.teardown().await;
        if let Some(bridge) = self.bridge.take() {
            bridge.cancellation_token.cancel();
            let _ = bridge.join_handle.await;
        }
        self.store
            .dispatch(StockAction::SetConnectionStatus(ConnectionStatus::Disconnected));
        self.session.ledger()
    }
}

impl Drop for StockProvider {
    fn drop(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            bridge.cancellation_token.cancel();
        }
        self.session.clear_handler();
    }
}

fn apply_push_frame(store: &StockStore, frame: FeedFrame) {
    let mut payload = frame.into_bytes();
    match parse_price_update(&mut payload, Utc::now()) {
        Ok(Some(update)) => {
            let symbol = update.symbol.clone();
            if !store.dispatch(StockAction::ApplyPriceUpdate(update)) {
                debug!(%symbol, "price update for untracked symbol dropped");
            }
        }
        Ok(None) => {}
        Err(error) => warn!(%error, "dropping malformed price update"),
    }
}

fn spawn_status_bridge(store: Arc<StockStore>, session: &FeedSession) -> StatusBridge {
    let cancellation_token = CancellationToken::new();
    let task_token = cancellation_token.clone();
    let mut status = session.watch_status();

    let join_handle = tokio::spawn(async move {
        let initial = *status.borrow_and_update();
        store.dispatch(StockAction::SetConnectionStatus(initial));

        loop {
            tokio::select! {
                _ = task_token.cancelled() => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = *status.borrow_and_update();
                    store.dispatch(StockAction::SetConnectionStatus(next));
                }
            }
        }
    });

    StatusBridge {
        cancellation_token,
        join_handle,
    }
}
