use std::sync::Arc;

use clap::Parser;

mod calc;
mod config;
mod handler;
mod http;
mod logger;
mod server;

/// Arithmetic JSON API server
#[derive(Parser)]
#[command(name = "calc-server")]
#[command(about = "HTTP/JSON service for add, subtract, multiply and divide")]
#[command(version)]
struct Cli {
    /// Configuration file path (extension optional)
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = config::Config::load_from(&cli.config)?;
    logger::init(&cfg)?;

    // Create Tokio runtime, sizing worker threads from config
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }

    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.socket_addr()?;
    let listener = server::create_listener(addr)?;

    logger::log_server_start(&listener.local_addr()?, &cfg);

    let shutdown = server::Shutdown::new();
    server::start_signal_handler(shutdown.clone())?;

    let state = Arc::new(config::AppState::new(cfg));
    server::start_server_loop(listener, state, &shutdown).await?;

    logger::log_info("Server stopped");
    Ok(())
}
