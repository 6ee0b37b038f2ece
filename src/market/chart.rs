use crate::market::types::{HistoryPoint, StockRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;

const MINUTE_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub time_ms: i64,
    pub price: f64,
}

pub fn minute_bucket(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_millis().div_euclid(MINUTE_MS) * MINUTE_MS
}

/// Builds the detail chart from history plus the live record.
///
/// The live price becomes the trailing point: it replaces the last history
/// point in the same minute and is appended when newer. Older live points, a
/// zero live price and empty history leave the series as history alone.
pub fn build_chart_series(
    history: &[HistoryPoint],
    live: Option<&StockRecord>,
    now: DateTime<Utc>,
) -> Vec<ChartPoint> {
    let mut series: Vec<ChartPoint> = history
        .iter()
        .map(|point| ChartPoint {
            time_ms: minute_bucket(point.timestamp),
            price: point.price,
        })
        .collect();

    let Some(live) = live.filter(|record| record.price > 0.0) else {
        return series;
    };
    let Some(last) = series.last().copied() else {
        return series;
    };

    let live_point = ChartPoint {
        time_ms: minute_bucket(live.last_updated.unwrap_or(now)),
        price: live.price,
    };

    if live_point.time_ms == last.time_ms {
        if let Some(slot) = series.last_mut() {
            *slot = live_point;
        }
    } else if live_point.time_ms > last.time_ms {
        series.push(live_point);
    }

    series
}
