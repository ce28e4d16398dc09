mod chat;
mod cli;
mod settings;

use std::path::Path;

use playhub_config::PlayhubConfig;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Command};

fn init_logging(args: &Args, config: &PlayhubConfig) {
    let log_directive = args
        .log_level
        .clone()
        .unwrap_or_else(|| format!("playhub={}", config.logging.level.as_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                log_directive
                    .parse()
                    .unwrap_or_else(|_| Directive::from(LevelFilter::INFO)),
            ),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args, config: PlayhubConfig) -> playhub_common::Result<()> {
    match args.command {
        Command::Config => {
            println!("{}", playhub_config::config_to_json(&config));
            Ok(())
        }
        Command::Chat { ref room } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(chat::run(&config, &args, room))
        }
    }
}

fn main() {
    let args = cli::parse();

    // The configured log level is needed before logging exists, so a
    // load failure is reported once the subscriber is installed.
    let config_result = match args.config {
        Some(ref path) => playhub_config::load_config_from(Path::new(path)),
        None => playhub_config::load_config(),
    };
    let config = match config_result {
        Ok(config) => {
            init_logging(&args, &config);
            config
        }
        Err(e) => {
            let config = PlayhubConfig::default();
            init_logging(&args, &config);
            tracing::warn!("Config load failed, using defaults: {e}");
            config
        }
    };

    tracing::info!("Playhub v{} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(ref path) = args.config {
        tracing::info!("Using config override: {path}");
    }

    if let Err(e) = run(args, config) {
        tracing::error!("{e}");
        eprintln!("playhub: {e}");
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
}
