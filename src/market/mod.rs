pub mod api;
pub mod chart;
pub mod connection;
pub mod ledger;
pub mod provider;
pub mod reducer;
pub mod store;
pub mod types;

pub const STOCK_FRAME_EVENT: &str = "stock_frame";
pub const STOCK_CHART_EVENT: &str = "stock_chart";
pub const LOAD_STATE_EVENT: &str = "load_state";
pub const FEED_STATUS_EVENT: &str = "feed_status";
