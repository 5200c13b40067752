//! airguide - MCP server entry point

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use airguide::backend::BackendHandle;
use airguide::cli::Args;
use airguide::config::Config;
use airguide::guidance::GuidanceService;
use airguide::server;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.log_filter())),
        )
        .init();

    let mut config = Config::load()?;
    args.apply_to(&mut config);

    // One-time initialization. A failed load leaves the backend Unavailable
    // and the server keeps running; every tool call then returns the fixed
    // advisory string until the operator fixes the deployment and restarts.
    let backend = BackendHandle::initialize(&config.model);
    let service = GuidanceService::new(backend);

    server::run_server(&config, service).await
}
