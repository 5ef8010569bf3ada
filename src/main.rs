mod api;
mod config;
mod content;
mod error;
mod media;
mod notion;
mod oauth;
mod runner;

use config::Config;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("Check your environment or .env file.");
            return ExitCode::from(e.exit_code());
        }
    };
    tracing::info!("Configuration loaded");

    match runner::run(&config).await {
        Ok(outcome) => {
            tracing::debug!(
                media_id = outcome.media_id.as_deref().unwrap_or("none"),
                characters = outcome.text.chars().count(),
                "Run finished"
            );
            println!(
                "\nPost published (id {}).",
                outcome.tweet_id.as_deref().unwrap_or("unknown")
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            println!("\nPost failed.");
            ExitCode::from(e.exit_code())
        }
    }
}
