//! Rotator - profile rotation with fund migration and position cycles

use anyhow::Result;
use clap::Parser;

use rotator::adapters::cli::{self, CliApp};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (RPC_URL and other secrets go here)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    cli::execute(app).await
}
