use crate::market::types::{canonical_symbol, ConnectionStatus, PriceUpdate, StockRecord};
use std::collections::HashMap;
use std::sync::Arc;

pub type StockMap = HashMap<String, Arc<StockRecord>>;

/// Client-side view of the market.
///
/// Every field is behind an `Arc` so actions that leave a field alone hand back
/// the same allocation; consumers can use `Arc::ptr_eq` to skip work.
#[derive(Debug, Clone, Default)]
pub struct StockState {
    pub stocks: Arc<StockMap>,
    pub order: Arc<Vec<String>>,
    pub connection_status: ConnectionStatus,
}

impl StockState {
    pub fn get(&self, symbol: &str) -> Option<&Arc<StockRecord>> {
        self.stocks.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Records in first-seen order.
    pub fn ordered(&self) -> Vec<Arc<StockRecord>> {
        self.order
            .iter()
            .filter_map(|symbol| self.stocks.get(symbol).cloned())
            .collect()
    }

    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.stocks, &other.stocks)
            && Arc::ptr_eq(&self.order, &other.order)
            && self.connection_status == other.connection_status
    }
}

#[derive(Debug, Clone)]
pub enum StockAction {
    ApplyPriceUpdate(PriceUpdate),
    ApplySnapshot(Vec<StockRecord>),
    SetConnectionStatus(ConnectionStatus),
}

pub fn stock_reducer(state: &StockState, action: StockAction) -> StockState {
    match action {
        StockAction::ApplyPriceUpdate(update) => apply_price_update(state, update),
        StockAction::ApplySnapshot(records) => apply_snapshot(state, records),
        StockAction::SetConnectionStatus(connection_status) => StockState {
            connection_status,
            ..state.clone()
        },
    }
}

fn apply_price_update(state: &StockState, update: PriceUpdate) -> StockState {
    let Some(symbol) = canonical_symbol(&update.symbol) else {
        return state.clone();
    };
    let Some(current) = state.stocks.get(&symbol) else {
        return state.clone();
    };

    let next = Arc::new(current.with_price(update.price, update.timestamp));
    let mut stocks = StockMap::clone(&state.stocks);
    stocks.insert(symbol, next);

    StockState {
        stocks: Arc::new(stocks),
        ..state.clone()
    }
}

fn apply_snapshot(state: &StockState, records: Vec<StockRecord>) -> StockState {
    if records.is_empty() {
        return state.clone();
    }

    let mut stocks = StockMap::clone(&state.stocks);
    let mut appended = Vec::new();
    let mut applied = false;

    for mut incoming in records {
        let Some(symbol) = canonical_symbol(&incoming.symbol) else {
            continue;
        };
        incoming.symbol = symbol;
        applied = true;

        let merged = match state.stocks.get(&incoming.symbol) {
            Some(existing) => merge_snapshot_record(existing, incoming),
            None => {
                if !stocks.contains_key(&incoming.symbol) {
                    appended.push(incoming.symbol.clone());
                }
                incoming
            }
        };
        stocks.insert(merged.symbol.clone(), Arc::new(merged));
    }
    if !applied {
        return state.clone();
    }

    let order = if appended.is_empty() {
        Arc::clone(&state.order)
    } else {
        let mut order = Vec::clone(&state.order);
        order.extend(appended);
        Arc::new(order)
    };

    StockState {
        stocks: Arc::new(stocks),
        order,
        connection_status: state.connection_status,
    }
}

/// Snapshots can lag behind live pushes: a zero price never replaces a known
/// price and a known update time always wins.
fn merge_snapshot_record(existing: &StockRecord, incoming: StockRecord) -> StockRecord {
    let price = if incoming.price == 0.0 {
        existing.price
    } else {
        incoming.price
    };

    StockRecord {
        price,
        last_updated: existing.last_updated.or(incoming.last_updated),
        ..incoming
    }
}
