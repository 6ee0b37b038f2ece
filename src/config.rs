use crate::error::AppError;
use crate::grid::{GridConfig, Viewport};
use crate::market::connection::{
    FeedConfig, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_HEARTBEAT_TIMEOUT_MS, DEFAULT_RECONNECT_BASE_MS, DEFAULT_RECONNECT_MAX_MS,
};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ORIGIN: &str = "http://localhost:8080";
pub const DEFAULT_VIEWPORT_WIDTH: f64 = 1_280.0;
pub const DEFAULT_VIEWPORT_HEIGHT: f64 = 800.0;

const MIN_RECONNECT_BASE_MS: u64 = 50;
const MAX_RECONNECT_BASE_MS: u64 = 60_000;
const MAX_RECONNECT_MAX_MS: u64 = 600_000;
const MIN_HEARTBEAT_INTERVAL_MS: u64 = 1_000;
const MAX_HEARTBEAT_INTERVAL_MS: u64 = 300_000;
const MIN_HEARTBEAT_TIMEOUT_MS: u64 = 500;
const MAX_HEARTBEAT_TIMEOUT_MS: u64 = 60_000;
const MIN_CONNECT_TIMEOUT_MS: u64 = 1_000;
const MAX_CONNECT_TIMEOUT_MS: u64 = 120_000;

const ENV_ORIGIN: &str = "STOCKPULSE_ORIGIN";
const ENV_WS_URL: &str = "STOCKPULSE_WS_URL";
const ENV_API_URL: &str = "STOCKPULSE_API_URL";
const ENV_RECONNECT_BASE_MS: &str = "STOCKPULSE_RECONNECT_BASE_MS";
const ENV_RECONNECT_MAX_MS: &str = "STOCKPULSE_RECONNECT_MAX_MS";
const ENV_HEARTBEAT_INTERVAL_MS: &str = "STOCKPULSE_HEARTBEAT_INTERVAL_MS";
const ENV_HEARTBEAT_TIMEOUT_MS: &str = "STOCKPULSE_HEARTBEAT_TIMEOUT_MS";
const ENV_CONNECT_TIMEOUT_MS: &str = "STOCKPULSE_CONNECT_TIMEOUT_MS";
const ENV_VIEWPORT_WIDTH: &str = "STOCKPULSE_VIEWPORT_WIDTH";
const ENV_VIEWPORT_HEIGHT: &str = "STOCKPULSE_VIEWPORT_HEIGHT";

#[derive(Debug, Clone, Default)]
pub struct ClientConfigArgs {
    pub origin: Option<String>,
    pub ws_url: Option<String>,
    pub api_url: Option<String>,
    pub reconnect_base_ms: Option<u64>,
    pub reconnect_max_ms: Option<u64>,
    pub heartbeat_interval_ms: Option<u64>,
    pub heartbeat_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub viewport_width: Option<f64>,
    pub viewport_height: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub feed: FeedConfig,
    pub api_base_url: String,
    pub grid: GridConfig,
    pub viewport: Viewport,
}

impl ClientConfigArgs {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Ok(Self {
            origin: text(ENV_ORIGIN),
            ws_url: text(ENV_WS_URL),
            api_url: text(ENV_API_URL),
            reconnect_base_ms: parse_var(ENV_RECONNECT_BASE_MS, text(ENV_RECONNECT_BASE_MS))?,
            reconnect_max_ms: parse_var(ENV_RECONNECT_MAX_MS, text(ENV_RECONNECT_MAX_MS))?,
            heartbeat_interval_ms: parse_var(
                ENV_HEARTBEAT_INTERVAL_MS,
                text(ENV_HEARTBEAT_INTERVAL_MS),
            )?,
            heartbeat_timeout_ms: parse_var(
                ENV_HEARTBEAT_TIMEOUT_MS,
                text(ENV_HEARTBEAT_TIMEOUT_MS),
            )?,
            connect_timeout_ms: parse_var(ENV_CONNECT_TIMEOUT_MS, text(ENV_CONNECT_TIMEOUT_MS))?,
            viewport_width: parse_var(ENV_VIEWPORT_WIDTH, text(ENV_VIEWPORT_WIDTH))?,
            viewport_height: parse_var(ENV_VIEWPORT_HEIGHT, text(ENV_VIEWPORT_HEIGHT))?,
        })
    }

    pub fn normalize(self) -> Result<ClientConfig, AppError> {
        let origin = self
            .origin
            .unwrap_or_else(|| DEFAULT_ORIGIN.to_string())
            .trim_end_matches('/')
            .to_string();
        let (scheme, host) = origin.split_once("://").ok_or_else(|| {
            AppError::InvalidArgument("origin must be an absolute http(s) URL".to_string())
        })?;
        if !matches!(scheme, "http" | "https") || host.is_empty() {
            return Err(AppError::InvalidArgument(
                "origin must be an absolute http(s) URL".to_string(),
            ));
        }

        let ws_url = match self.ws_url {
            Some(url) => url,
            None => {
                let ws_scheme = if scheme == "https" { "wss" } else { "ws" };
                format!("{ws_scheme}://{host}/ws")
            }
        };
        if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
            return Err(AppError::InvalidArgument(
                "feed URL must use ws:// or wss://".to_string(),
            ));
        }

        let api_base_url = self
            .api_url
            .unwrap_or_else(|| format!("{origin}/api"))
            .trim_end_matches('/')
            .to_string();
        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            return Err(AppError::InvalidArgument(
                "API URL must use http:// or https://".to_string(),
            ));
        }

        let reconnect_base_ms = self.reconnect_base_ms.unwrap_or(DEFAULT_RECONNECT_BASE_MS);
        if !(MIN_RECONNECT_BASE_MS..=MAX_RECONNECT_BASE_MS).contains(&reconnect_base_ms) {
            return Err(AppError::InvalidArgument(format!(
                "reconnect base must be between {MIN_RECONNECT_BASE_MS} and {MAX_RECONNECT_BASE_MS} ms"
            )));
        }

        let reconnect_max_ms = self.reconnect_max_ms.unwrap_or(DEFAULT_RECONNECT_MAX_MS);
        if !(reconnect_base_ms..=MAX_RECONNECT_MAX_MS).contains(&reconnect_max_ms) {
            return Err(AppError::InvalidArgument(format!(
                "reconnect max must be between the base delay and {MAX_RECONNECT_MAX_MS} ms"
            )));
        }

        let heartbeat_interval_ms = self
            .heartbeat_interval_ms
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS);
        if !(MIN_HEARTBEAT_INTERVAL_MS..=MAX_HEARTBEAT_INTERVAL_MS).contains(&heartbeat_interval_ms)
        {
            return Err(AppError::InvalidArgument(format!(
                "heartbeat interval must be between {MIN_HEARTBEAT_INTERVAL_MS} and {MAX_HEARTBEAT_INTERVAL_MS} ms"
            )));
        }

        let heartbeat_timeout_ms = self
            .heartbeat_timeout_ms
            .unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT_MS);
        if !(MIN_HEARTBEAT_TIMEOUT_MS..=MAX_HEARTBEAT_TIMEOUT_MS).contains(&heartbeat_timeout_ms) {
            return Err(AppError::InvalidArgument(format!(
                "heartbeat timeout must be between {MIN_HEARTBEAT_TIMEOUT_MS} and {MAX_HEARTBEAT_TIMEOUT_MS} ms"
            )));
        }

        let connect_timeout_ms = self.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS);
        if !(MIN_CONNECT_TIMEOUT_MS..=MAX_CONNECT_TIMEOUT_MS).contains(&connect_timeout_ms) {
            return Err(AppError::InvalidArgument(format!(
                "connect timeout must be between {MIN_CONNECT_TIMEOUT_MS} and {MAX_CONNECT_TIMEOUT_MS} ms"
            )));
        }

        let viewport_width = self.viewport_width.unwrap_or(DEFAULT_VIEWPORT_WIDTH);
        let viewport_height = self.viewport_height.unwrap_or(DEFAULT_VIEWPORT_HEIGHT);
        if !viewport_width.is_finite()
            || !viewport_height.is_finite()
            || viewport_width < 0.0
            || viewport_height < 0.0
        {
            return Err(AppError::InvalidArgument(
                "viewport dimensions must be finite non-negative numbers".to_string(),
            ));
        }

        Ok(ClientConfig {
            feed: FeedConfig {
                url: ws_url,
                reconnect_base: Duration::from_millis(reconnect_base_ms),
                reconnect_max: Duration::from_millis(reconnect_max_ms),
                heartbeat_interval: Duration::from_millis(heartbeat_interval_ms),
                heartbeat_timeout: Duration::from_millis(heartbeat_timeout_ms),
                connect_timeout: Duration::from_millis(connect_timeout_ms),
            },
            api_base_url,
            grid: GridConfig::default(),
            viewport: Viewport::new(viewport_width, viewport_height),
        })
    }
}

fn parse_var<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, AppError> {
    value
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| AppError::InvalidArgument(format!("{key} has invalid value '{raw}'")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn normalizes_defaults() {
        let config = ClientConfigArgs::default()
            .normalize()
            .expect("defaults should be valid");

        assert_eq!(config.feed.url, "ws://localhost:8080/ws");
        assert_eq!(config.api_base_url, "http://localhost:8080/api");
        assert_eq!(config.feed.reconnect_base, Duration::from_millis(1_000));
        assert_eq!(config.feed.reconnect_max, Duration::from_millis(30_000));
        assert_eq!(config.feed.heartbeat_interval, Duration::from_millis(30_000));
        assert_eq!(config.feed.heartbeat_timeout, Duration::from_millis(5_000));
        assert_eq!(config.feed.connect_timeout, Duration::from_millis(10_000));
        assert_eq!(config.viewport.container_width, DEFAULT_VIEWPORT_WIDTH);
    }

    #[test]
    fn derives_secure_feed_url_from_https_origin() {
        let args = ClientConfigArgs::from_lookup(lookup(&[(ENV_ORIGIN, "https://quotes.example.com/")]))
            .unwrap();
        let config = args.normalize().unwrap();

        assert_eq!(config.feed.url, "wss://quotes.example.com/ws");
        assert_eq!(config.api_base_url, "https://quotes.example.com/api");
    }

    #[test]
    fn explicit_urls_override_origin() {
        let args = ClientConfigArgs::from_lookup(lookup(&[
            (ENV_WS_URL, "ws://127.0.0.1:9000/feed"),
            (ENV_API_URL, "http://127.0.0.1:9001/v1/"),
            (ENV_RECONNECT_BASE_MS, "250"),
        ]))
        .unwrap();
        let config = args.normalize().unwrap();

        assert_eq!(config.feed.url, "ws://127.0.0.1:9000/feed");
        assert_eq!(config.api_base_url, "http://127.0.0.1:9001/v1");
        assert_eq!(config.feed.reconnect_base, Duration::from_millis(250));
    }

    #[test]
    fn rejects_unparseable_and_out_of_range_values() {
        assert!(ClientConfigArgs::from_lookup(lookup(&[(ENV_HEARTBEAT_TIMEOUT_MS, "soon")])).is_err());

        let inverted = ClientConfigArgs {
            reconnect_base_ms: Some(5_000),
            reconnect_max_ms: Some(1_000),
            ..Default::default()
        };
        assert!(inverted.normalize().is_err());

        let bad_scheme = ClientConfigArgs {
            ws_url: Some("http://localhost/ws".to_string()),
            ..Default::default()
        };
        assert!(bad_scheme.normalize().is_err());

        let bad_origin = ClientConfigArgs {
            origin: Some("localhost:8080".to_string()),
            ..Default::default()
        };
        assert!(bad_origin.normalize().is_err());
    }
}
