use crate::error::AppError;
use crate::grid::{compute_grid_layout, GridLayout, Viewport};
use crate::market::api::fetch_stock_history;
use crate::market::chart::{build_chart_series, ChartPoint};
use crate::market::provider::LoadState;
use crate::market::types::{normalize_symbol, ConnectionStatus, StockRecord};
use crate::state::AppState;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChart {
    pub symbol: String,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardFrame {
    pub status: ConnectionStatus,
    pub load_state: LoadState,
    pub total_count: usize,
    pub layout: GridLayout,
    pub stocks: Vec<Arc<StockRecord>>,
}

pub async fn load_stocks(state: &AppState) -> Result<LoadState, AppError> {
    let feed_slot = state.stock_feed.lock().await;
    let provider = feed_slot.as_ref().ok_or(AppError::FeedNotRunning)?;

    if state.store.snapshot().is_empty() {
        *state.load_state.write().await = LoadState::Loading;
    }
    let load_state = provider
        .load_stocks(&state.http_client, &state.config.api_base_url)
        .await;
    *state.load_state.write().await = load_state.clone();
    Ok(load_state)
}

pub async fn stock_history(state: &AppState, symbol: &str) -> Result<StockChart, AppError> {
    let symbol = normalize_symbol(symbol)?;
    let history =
        fetch_stock_history(&state.http_client, &state.config.api_base_url, &symbol).await?;
    let snapshot = state.store.snapshot();
    let live = snapshot.get(&symbol).map(Arc::as_ref);

    Ok(StockChart {
        points: build_chart_series(&history, live, Utc::now()),
        symbol,
    })
}

/// Visible slice of the stock grid for the given viewport.
pub async fn dashboard_frame(state: &AppState, viewport: Option<Viewport>) -> DashboardFrame {
    let viewport = viewport.unwrap_or(state.config.viewport);
    let count = state.store.snapshot().len();
    let layout = compute_grid_layout(&state.config.grid, count, &viewport);
    dashboard_frame_for_layout(state, layout).await
}

/// Frame for a layout computed elsewhere, such as a [`GridTracker`].
///
/// [`GridTracker`]: crate::grid::GridTracker
pub async fn dashboard_frame_for_layout(state: &AppState, layout: GridLayout) -> DashboardFrame {
    let snapshot = state.store.snapshot();
    let stocks = layout
        .visible_indices()
        .filter_map(|index| snapshot.order.get(index))
        .filter_map(|symbol| snapshot.get(symbol).cloned())
        .collect();

    DashboardFrame {
        status: snapshot.connection_status,
        load_state: state.load_state.read().await.clone(),
        total_count: snapshot.len(),
        layout,
        stocks,
    }
}
