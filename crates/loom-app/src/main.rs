mod cli;
mod commands;
mod render;
mod repl;

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

const FALLBACK_DIRECTIVE: &str = "loom=info";

fn init_logging(directive: &str, explicit: bool) {
    // An explicit --log-level beats RUST_LOG, which beats the config file.
    let filter = if explicit {
        EnvFilter::try_new(directive)
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(directive))
    };
    let filter = filter.unwrap_or_else(|e| {
        eprintln!("invalid log filter {directive:?} ({e}), using {FALLBACK_DIRECTIVE}");
        EnvFilter::new(FALLBACK_DIRECTIVE)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    let loaded = match &args.config {
        Some(path) => loom_config::load_config_from(path),
        None => loom_config::load_config(),
    };
    let (config, load_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (loom_config::LoomConfig::default(), Some(e)),
    };

    init_logging(
        &args.log_directive(config.logging.level.directive()),
        args.log_level.is_some(),
    );
    tracing::info!("loom v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(path) = &args.config {
        tracing::info!("Using config override: {}", path.display());
    }
    if let Some(e) = load_error {
        tracing::warn!("Config load failed, using defaults: {e}");
    }

    match commands::run(args.command(), config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
