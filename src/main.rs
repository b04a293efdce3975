use std::process::ExitCode;

use tracing::{error, info};

use filedrop::{AppState, Config, PurgeEngine, Readiness, WebServer};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> ExitCode {
    if std::env::args().skip(1).any(|a| a == "--version" || a == "-V") {
        println!(
            "filedrop v{} ({})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::ARCH
        );
        return ExitCode::SUCCESS;
    }

    // Load configuration
    let mut config = match Config::load(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {CONFIG_PATH}: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };
    config.apply_env_overrides();

    // Initialize logging
    if let Err(e) = filedrop::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        filedrop::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> filedrop::Result<()> {
    info!("{}", "-".repeat(80));
    info!(
        "Starting filedrop v{} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::ARCH
    );
    info!("Storage location: {}", config.storage_root().display());
    match config.purge.default_ttl()? {
        Some(ttl) => info!("Default purge: {}", filedrop::datetime::format_duration(ttl)),
        None => info!("Default purge: never"),
    }

    let state = AppState::from_config(&config)?;
    info!("Storage URL: {}", state.storage_url);

    let purge = PurgeEngine::new(state.store.clone(), config.purge.frequency()?).start();

    let readiness = Readiness::new();
    let server = WebServer::new(&config, state, readiness)?;
    let served = server.run(shutdown_signal()).await;

    purge.shutdown().await;
    info!("All jobs have stopped");

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Application is stopping");
}
