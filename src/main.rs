use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod crawler;
mod database;
mod discovery;
mod error;
mod extractors;
mod fetcher;
mod models;
mod normalize;
mod scoring;
mod validator;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<(), error::ScoutError> {
    dotenv::dotenv().ok();

    let args = Cli::parse();
    let config = config::load_config(&args.config).await.unwrap_or_default();

    let default_filter = format!("contact_scout={},hyper=warn", config.logging.level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(true)
        .init();

    debug!("🚀 contact-scout starting (config: {})", args.config);

    cli::run(args).await
}
