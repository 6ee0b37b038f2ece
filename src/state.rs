use crate::config::ClientConfig;
use crate::market::provider::{LoadState, StockProvider};
use crate::market::store::StockStore;
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

pub struct AppState {
    pub started_at: Instant,
    pub config: ClientConfig,
    pub http_client: Client,
    pub store: Arc<StockStore>,
    pub stock_feed: Mutex<Option<StockProvider>>,
    pub load_state: Arc<RwLock<LoadState>>,
}

impl AppState {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            started_at: Instant::now(),
            config,
            http_client: Client::new(),
            store: Arc::new(StockStore::new()),
            stock_feed: Mutex::new(None),
            load_state: Arc::new(RwLock::new(LoadState::Idle)),
        }
    }
}
