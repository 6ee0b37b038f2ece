use serde::Serialize;

const APP_IDENTIFIER: &str = "com.stockpulse.client";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfoResponse {
    pub product_name: String,
    pub version: String,
    pub identifier: String,
    pub platform: String,
    pub arch: String,
}

pub fn build_app_info_response(
    product_name: String,
    version: String,
    identifier: String,
) -> AppInfoResponse {
    AppInfoResponse {
        product_name,
        version,
        identifier,
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
    }
}

pub fn app_info() -> AppInfoResponse {
    build_app_info_response(
        env!("CARGO_PKG_NAME").to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
        APP_IDENTIFIER.to_string(),
    )
}
