pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod grid;
pub mod logging;
pub mod market;
pub mod state;

use chrono::Utc;
use commands::stock_feed::{
    start_stock_feed, stop_stock_feed, subscribe_symbols, unsubscribe_symbols,
};
use commands::stocks::{dashboard_frame_for_layout, load_stocks, StockChart};
use config::ClientConfigArgs;
use error::AppError;
use events::{emit, spawn_stdin_viewports};
use grid::GridTracker;
use market::api::{fetch_stock_history, fetch_stock_list};
use market::chart::build_chart_series;
use market::provider::LoadState;
use market::reducer::{StockAction, StockState};
use market::types::{normalize_symbol, StockRecord};
use market::{FEED_STATUS_EVENT, LOAD_STATE_EVENT, STOCK_CHART_EVENT, STOCK_FRAME_EVENT};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const FRAME_INTERVAL: Duration = Duration::from_millis(250);
const LOAD_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Runs the headless client until Ctrl-C.
///
/// With a symbol argument it follows that symbol's chart, otherwise it streams
/// dashboard frames for the viewport lines read from stdin.
pub async fn run() -> Result<(), AppError> {
    let config = ClientConfigArgs::from_env()?.normalize()?;
    let state = AppState::new(config);
    let detail_symbol = std::env::args()
        .nth(1)
        .map(|raw| normalize_symbol(&raw))
        .transpose()?;

    let session = start_stock_feed(&state).await?;
    info!(url = %session.url, api = %state.config.api_base_url, "stockpulse running");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    let signal_task = tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        signal_token.cancel();
    });

    let result = match detail_symbol {
        Some(symbol) => run_detail(&state, &symbol, &shutdown).await,
        None => run_dashboard(&state, &shutdown).await,
    };
    signal_task.abort();

    stop_stock_feed(&state).await?;
    info!("stockpulse stopped");
    result
}

async fn run_dashboard(state: &AppState, shutdown: &CancellationToken) -> Result<(), AppError> {
    loop {
        let load_state = load_stocks(state).await?;
        emit(LOAD_STATE_EVENT, &load_state)?;
        if !load_state.is_failed() {
            break;
        }
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(LOAD_RETRY_DELAY) => {}
        }
    }

    let changes = state.store.watch();
    let item_count = changes.borrow().len();
    let (viewport_tx, viewport_rx) = watch::channel(state.config.viewport);
    let (count_tx, count_rx) = watch::channel(item_count);
    spawn_stdin_viewports(viewport_tx)?;

    let tracker = GridTracker::spawn(state.config.grid, viewport_rx, count_rx);
    let result = stream_dashboard_frames(state, shutdown, &tracker, changes, count_tx).await;
    tracker.stop().await;
    result
}

/// Emits a frame at most once per tick, after the store or the tracked layout
/// changed.
async fn stream_dashboard_frames(
    state: &AppState,
    shutdown: &CancellationToken,
    tracker: &GridTracker,
    mut changes: watch::Receiver<StockState>,
    item_count: watch::Sender<usize>,
) -> Result<(), AppError> {
    let mut layouts = tracker.watch();
    layouts.borrow_and_update();
    let mut last_status = changes.borrow_and_update().connection_status;
    emit(FEED_STATUS_EVENT, &last_status)?;
    emit(
        STOCK_FRAME_EVENT,
        &dashboard_frame_for_layout(state, tracker.layout()).await,
    )?;

    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut dirty = false;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            changed = changes.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let (status, count) = {
                    let current = changes.borrow_and_update();
                    (current.connection_status, current.len())
                };
                item_count.send_if_modified(|current| {
                    if *current == count {
                        return false;
                    }
                    *current = count;
                    true
                });
                if status != last_status {
                    last_status = status;
                    emit(FEED_STATUS_EVENT, &status)?;
                }
                dirty = true;
            }
            changed = layouts.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                layouts.borrow_and_update();
                dirty = true;
            }
            _ = ticker.tick() => {
                if dirty {
                    dirty = false;
                    emit(
                        STOCK_FRAME_EVENT,
                        &dashboard_frame_for_layout(state, tracker.layout()).await,
                    )?;
                }
            }
        }
    }
}

async fn run_detail(
    state: &AppState,
    symbol: &str,
    shutdown: &CancellationToken,
) -> Result<(), AppError> {
    loop {
        match fetch_stock_list(&state.http_client, &state.config.api_base_url).await {
            Ok(items) => {
                let records: Vec<StockRecord> = items.into_iter().map(StockRecord::from).collect();
                state.store.dispatch(StockAction::ApplySnapshot(records));
                break;
            }
            Err(error) => {
                let load_state = LoadState::Failed {
                    reason: error.to_string(),
                    retryable: true,
                };
                emit(LOAD_STATE_EVENT, &load_state)?;
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(LOAD_RETRY_DELAY) => {}
                }
            }
        }
    }

    if state.store.snapshot().get(symbol).is_none() {
        return Err(AppError::InvalidArgument(format!("unknown symbol {symbol}")));
    }
    subscribe_symbols(state, vec![symbol.to_string()]).await?;

    let history = match fetch_stock_history(
        &state.http_client,
        &state.config.api_base_url,
        symbol,
    )
    .await
    {
        Ok(history) => history,
        Err(error) => {
            warn!(%error, %symbol, "history unavailable, charting live prices only");
            Vec::new()
        }
    };

    let mut changes = state.store.watch();
    let mut last_record = changes.borrow_and_update().get(symbol).cloned();
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut dirty = true;

    let result = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            changed = changes.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let record = changes.borrow_and_update().get(symbol).cloned();
                let moved = match (&record, &last_record) {
                    (Some(next), Some(previous)) => !Arc::ptr_eq(next, previous),
                    (next, previous) => next.is_some() != previous.is_some(),
                };
                if moved {
                    last_record = record;
                    dirty = true;
                }
            }
            _ = ticker.tick() => {
                if dirty {
                    dirty = false;
                    let chart = StockChart {
                        symbol: symbol.to_string(),
                        points: build_chart_series(&history, last_record.as_deref(), Utc::now()),
                    };
                    if let Err(error) = emit(STOCK_CHART_EVENT, &chart) {
                        break Err(error);
                    }
                }
            }
        }
    };

    unsubscribe_symbols(state, vec![symbol.to_string()]).await?;
    result
}
