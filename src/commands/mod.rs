pub mod app_info;
pub mod health;
pub mod stock_feed;
pub mod stocks;
