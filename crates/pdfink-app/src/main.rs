//! Main application entry point.

use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; explicit environment still applies.
    dotenvy::dotenv().ok();
    env_logger::init();
    log::info!("Starting pdfink");

    pdfink_app::run(pdfink_app::Cli::parse()).await
}
