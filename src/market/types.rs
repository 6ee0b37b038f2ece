use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ACTION_SUBSCRIBE: &str = "subscribe";
pub const ACTION_UNSUBSCRIBE: &str = "unsubscribe";
pub const ACTION_PING: &str = "ping";
pub const ACTION_PONG: &str = "pong";
pub const MAX_SYMBOL_LEN: usize = 16;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }

    pub fn is_down(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockRecord {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl StockRecord {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            price,
            last_updated: None,
        }
    }

    pub fn with_price(&self, price: f64, last_updated: DateTime<Utc>) -> Self {
        Self {
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            price,
            last_updated: Some(last_updated),
        }
    }
}

/// Row of the `GET /stocks` listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockListItem {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub price: f64,
}

impl From<StockListItem> for StockRecord {
    fn from(value: StockListItem) -> Self {
        Self::new(value.symbol, value.name, value.price)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PriceUpdateWire {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Decodes a push frame into a price update.
///
/// Frames carrying one of the protocol actions, lacking `symbol`/`price`, or
/// priced at zero are not price updates and yield `Ok(None)`. A frame without a
/// timestamp is stamped with `received_at`.
pub fn parse_price_update(
    payload: &mut [u8],
    received_at: DateTime<Utc>,
) -> Result<Option<PriceUpdate>, AppError> {
    let wire: PriceUpdateWire = simd_json::serde::from_slice(payload)?;
    if wire.action.as_deref().is_some_and(is_protocol_action) {
        return Ok(None);
    }

    let (Some(symbol), Some(price)) = (wire.symbol, wire.price) else {
        return Ok(None);
    };
    let Some(symbol) = canonical_symbol(&symbol) else {
        return Ok(None);
    };
    if price == 0.0 {
        return Ok(None);
    }
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::InvalidArgument(format!(
            "price for {symbol} must be finite and non-negative"
        )));
    }

    Ok(Some(PriceUpdate {
        symbol,
        price,
        timestamp: wire.timestamp.unwrap_or(received_at),
    }))
}

pub fn is_protocol_action(action: &str) -> bool {
    matches!(
        action,
        ACTION_SUBSCRIBE | ACTION_UNSUBSCRIBE | ACTION_PING | ACTION_PONG
    )
}

#[derive(Debug, Deserialize)]
struct FrameEnvelope {
    #[serde(default)]
    action: Option<String>,
}

/// Returns the `action` of an inbound frame, failing when the frame is not a
/// JSON object.
pub fn parse_frame_action(payload: &mut [u8]) -> Result<Option<String>, AppError> {
    let envelope: FrameEnvelope = simd_json::serde::from_slice(payload)?;
    Ok(envelope.action)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum OutboundFrame {
    Subscribe { symbols: Vec<String> },
    Unsubscribe { symbols: Vec<String> },
    Ping,
}

impl OutboundFrame {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => ACTION_SUBSCRIBE,
            Self::Unsubscribe { .. } => ACTION_UNSUBSCRIBE,
            Self::Ping => ACTION_PING,
        }
    }
}

pub fn encode_frame(frame: &OutboundFrame) -> Result<String, AppError> {
    Ok(simd_json::serde::to_string(frame)?)
}

/// Store key for a symbol from feed or REST data: trimmed and upper-cased.
/// Returns `None` for a blank symbol.
pub fn canonical_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim();
    if symbol.is_empty() {
        return None;
    }
    Some(symbol.to_uppercase())
}

/// Validates a symbol the client sends in a subscribe/unsubscribe frame or a
/// request path.
pub fn normalize_symbol(raw: &str) -> Result<String, AppError> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty()
        || symbol.len() > MAX_SYMBOL_LEN
        || !symbol
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '.' || ch == '-')
    {
        return Err(AppError::InvalidArgument(format!(
            "symbol '{raw}' must be 1-{MAX_SYMBOL_LEN} ASCII alphanumerics, '.' or '-'"
        )));
    }
    Ok(symbol)
}

pub fn normalize_symbols<S: AsRef<str>>(raw: &[S]) -> Result<Vec<String>, AppError> {
    raw.iter().map(|symbol| normalize_symbol(symbol.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn received_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 27, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_price_update_payload() {
        let mut payload =
            br#"{"symbol":"AAPL","price":151.25,"timestamp":"2026-01-27T12:00:05Z"}"#.to_vec();
        let update = parse_price_update(&mut payload, received_at())
            .expect("payload should parse")
            .expect("payload is a price update");

        assert_eq!(update.symbol, "AAPL");
        assert_eq!(update.price, 151.25);
        assert_eq!(
            update.timestamp,
            Utc.with_ymd_and_hms(2026, 1, 27, 12, 0, 5).unwrap()
        );
    }

    #[test]
    fn stamps_update_without_timestamp_with_receipt_time() {
        let mut payload = br#"{"symbol":"msft","price":410}"#.to_vec();
        let update = parse_price_update(&mut payload, received_at())
            .expect("payload should parse")
            .expect("payload is a price update");

        assert_eq!(update.symbol, "MSFT");
        assert_eq!(update.price, 410.0);
        assert_eq!(update.timestamp, received_at());
    }

    #[test]
    fn ignores_protocol_frames_and_incomplete_pushes() {
        let mut pong = br#"{"action":"pong"}"#.to_vec();
        assert_eq!(parse_price_update(&mut pong, received_at()).unwrap(), None);

        let mut ack = br#"{"action":"subscribe","symbol":"AAPL","price":1.0}"#.to_vec();
        assert_eq!(parse_price_update(&mut ack, received_at()).unwrap(), None);

        let mut no_price = br#"{"symbol":"AAPL"}"#.to_vec();
        assert_eq!(parse_price_update(&mut no_price, received_at()).unwrap(), None);
    }

    #[test]
    fn unknown_action_with_symbol_and_price_is_an_update() {
        let mut payload = br#"{"action":"tick","symbol":"AAPL","price":10.5}"#.to_vec();
        let update = parse_price_update(&mut payload, received_at()).unwrap();
        assert!(update.is_some());
    }

    #[test]
    fn rejects_negative_price_and_garbage() {
        let mut negative = br#"{"symbol":"AAPL","price":-1}"#.to_vec();
        assert!(parse_price_update(&mut negative, received_at()).is_err());

        let mut garbage = b"not json".to_vec();
        assert!(parse_price_update(&mut garbage, received_at()).is_err());
    }

    #[test]
    fn zero_price_push_is_not_an_update() {
        let mut payload = br#"{"symbol":"AAPL","price":0,"timestamp":"2026-01-27T12:00:05Z"}"#.to_vec();
        assert_eq!(parse_price_update(&mut payload, received_at()).unwrap(), None);
    }

    #[test]
    fn push_symbols_are_not_held_to_subscribe_rules() {
        let mut index = br#"{"symbol":" ^gspc ","price":5000.5}"#.to_vec();
        let update = parse_price_update(&mut index, received_at())
            .unwrap()
            .expect("index push is a price update");
        assert_eq!(update.symbol, "^GSPC");

        let mut blank = br#"{"symbol":"  ","price":1.0}"#.to_vec();
        assert_eq!(parse_price_update(&mut blank, received_at()).unwrap(), None);
    }

    #[test]
    fn canonicalizes_listed_symbols() {
        assert_eq!(canonical_symbol(" brk/b ").as_deref(), Some("BRK/B"));
        assert_eq!(canonical_symbol("   "), None);
    }

    #[test]
    fn encodes_outbound_frames() {
        let subscribe = OutboundFrame::Subscribe {
            symbols: vec!["AAPL".to_string(), "GOOGL".to_string()],
        };
        assert_eq!(
            encode_frame(&subscribe).unwrap(),
            r#"{"action":"subscribe","symbols":["AAPL","GOOGL"]}"#
        );
        assert_eq!(encode_frame(&OutboundFrame::Ping).unwrap(), r#"{"action":"ping"}"#);
    }

    #[test]
    fn reads_frame_action() {
        let mut pong = br#"{"action":"pong"}"#.to_vec();
        assert_eq!(parse_frame_action(&mut pong).unwrap().as_deref(), Some("pong"));

        let mut push = br#"{"symbol":"AAPL","price":1}"#.to_vec();
        assert_eq!(parse_frame_action(&mut push).unwrap(), None);

        let mut broken = br#"{"action":"#.to_vec();
        assert!(parse_frame_action(&mut broken).is_err());
    }

    #[test]
    fn normalizes_symbols() {
        assert_eq!(normalize_symbol(" brk.b ").unwrap(), "BRK.B");
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("AA PL").is_err());
        assert!(normalize_symbols(&["aapl", "$$"]).is_err());
    }

    #[test]
    fn serializes_status_lowercase() {
        let encoded = simd_json::serde::to_string(&ConnectionStatus::Connected).unwrap();
        assert_eq!(encoded, r#""connected""#);
        assert!(ConnectionStatus::Error.is_down());
        assert!(!ConnectionStatus::Connecting.is_down());
    }
}
