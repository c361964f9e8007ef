// src/main.rs
use std::process::ExitCode;

use stow_it_now::config::{AppConfig, LogConfig};
use stow_it_now::persistence::load_state;
use stow_it_now::{Inventory, InventoryState, api, observability};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    observability::init(LogConfig::from_env());
    if let Err(err) = dotenv {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!(error = %err, "could not load .env");
        }
    }

    let config = AppConfig::from_env();
    let state_file = config.engine.state_file().cloned();

    let state = match state_file.as_deref().map(load_state).transpose() {
        Ok(Some(Some(state))) => state,
        Ok(_) => InventoryState::new(config.engine.sim_epoch()),
        Err(err) => {
            error!(error = %err, "refusing to start with an unreadable inventory snapshot");
            return ExitCode::FAILURE;
        }
    };
    info!(clock = %state.clock(), "stowage service starting");

    let app = api::router(Inventory::new(state), state_file);
    if let Err(err) = api::start_api_server(&config.api, app).await {
        error!(error = %err, "API server terminated with an error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
