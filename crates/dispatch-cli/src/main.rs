//! Dispatch CLI entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use dispatch_cli::cli::Cli;
use dispatch_cli::commands;
use dispatch_core::Layout;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));

    fmt().with_env_filter(filter).with_target(false).init();

    let layout = Layout::new(cli.state_dir());
    // API keys live in .env.local
    layout.load_env();

    if let Err(e) = commands::execute(cli.command, &layout).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
