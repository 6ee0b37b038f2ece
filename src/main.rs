use tracing::error;

#[tokio::main]
async fn main() {
    stockpulse_lib::logging::init();

    if let Err(err) = stockpulse_lib::run().await {
        error!(error = %err, "stockpulse exited with an error");
        std::process::exit(1);
    }
}
