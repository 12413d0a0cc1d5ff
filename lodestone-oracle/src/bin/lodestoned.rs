use lodestone_oracle::{config::OracleConfig, engine::Engine};
use std::{path::PathBuf, process::ExitCode};
use tracing::error;

/// Oracle side-car entry point.
///
/// Usage: `lodestoned <config.json>`. Exits non-zero on startup validation
/// failure (invalid config, invalid market map source config, bind failure);
/// exits zero on clean shutdown.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let Some(config_path) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("usage: lodestoned <config.json>");
        return ExitCode::from(2);
    };

    let config = match OracleConfig::load(&config_path) {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(error) => {
            error!(%error, "failed to initialise engine");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(engine.run(async {
        let _ = tokio::signal::ctrl_c().await;
    }));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "engine exited with error");
            ExitCode::FAILURE
        }
    }
}
