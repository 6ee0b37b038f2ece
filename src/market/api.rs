use crate::error::AppError;
use crate::market::types::{canonical_symbol, normalize_symbol, HistoryPoint, StockListItem};
use reqwest::Client;
use tracing::{debug, warn};

fn stocks_endpoint(api_base_url: &str) -> String {
    format!("{}/stocks", api_base_url.trim_end_matches('/'))
}

fn history_endpoint(api_base_url: &str, symbol: &str) -> String {
    format!(
        "{}/stocks/{symbol}/history",
        api_base_url.trim_end_matches('/')
    )
}

/// Fetches the stock list. Entries with a blank symbol or an unusable price
/// are skipped; the rest are returned with canonical symbols.
pub async fn fetch_stock_list(
    client: &Client,
    api_base_url: &str,
) -> Result<Vec<StockListItem>, AppError> {
    let endpoint = stocks_endpoint(api_base_url);
    let response = client.get(&endpoint).send().await?.error_for_status()?;
    let payload = response.json::<Vec<StockListItem>>().await?;

    let listed = payload.len();
    let mut stocks = Vec::with_capacity(listed);
    for item in payload {
        let Some(symbol) = canonical_symbol(&item.symbol) else {
            warn!(name = %item.name, "skipping listed stock without a symbol");
            continue;
        };
        if !item.price.is_finite() || item.price < 0.0 {
            warn!(%symbol, price = item.price, "skipping listed stock with invalid price");
            continue;
        }
        stocks.push(StockListItem { symbol, ..item });
    }

    debug!(count = stocks.len(), listed, %endpoint, "fetched stock list");
    Ok(stocks)
}

pub async fn fetch_stock_history(
    client: &Client,
    api_base_url: &str,
    symbol: &str,
) -> Result<Vec<HistoryPoint>, AppError> {
    let symbol = normalize_symbol(symbol)?;
    let endpoint = history_endpoint(api_base_url, &symbol);
    let response = client.get(&endpoint).send().await?.error_for_status()?;
    let mut history = response.json::<Vec<HistoryPoint>>().await?;
    history.sort_by_key(|point| point.timestamp);

    debug!(count = history.len(), %symbol, "fetched stock history");
    Ok(history)
}
