use std::{process, sync::Arc, time::Duration};

use colored::Colorize;
use jamhub_hub::{DatabaseError, Hub, HubConfig, JacktripLauncher, RoomError, SqliteDatabase};
use jamhub_server::{run_server, ServeError, ServerHandle};
use log::{error, info, warn};
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};

mod logging;

/// How long in-flight requests get to finish once shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
enum HubError {
    #[error("Could not prepare the data directory: {0}")]
    DataDir(std::io::Error),
    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),
    #[error("Could not create the default room: {0}")]
    DefaultRoom(#[from] RoomError),
    #[error(transparent)]
    Serve(#[from] ServeError),
}

impl HubError {
    fn hint(&self) -> String {
        match self {
            HubError::DataDir(_) => {
                "Check that HUB_DATA_DIR points at a writable directory.".to_string()
            }
            HubError::Database(_) => {
                "The user database could not be opened. Check permissions on the data directory."
                    .to_string()
            }
            HubError::DefaultRoom(_) => {
                "Single room mode could not start its room. Check TRANSPORT_BIN and the port range."
                    .to_string()
            }
            HubError::Serve(_) => {
                "The HTTP listener failed. Check HUB_PORT and the TLS configuration.".to_string()
            }
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init_logger();

    if let Err(error) = run().await {
        error!(
            "{} Read the error below to troubleshoot the issue.",
            "jamhub failed to start!".bold().red()
        );
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).italic());
        process::exit(1);
    }
}

async fn run() -> Result<(), HubError> {
    let config = HubConfig::from_env();

    std::fs::create_dir_all(&config.data_dir).map_err(HubError::DataDir)?;

    info!("Opening user database at {}", config.db_path().display());
    let database = SqliteDatabase::connect(&config.db_path()).await?;

    let launcher = Arc::new(JacktripLauncher::new(config.transport_bin.clone()));
    let hub = Arc::new(Hub::new(config.clone(), database, launcher));

    // In single room mode the default room exists before anyone logs in
    hub.init().await?;

    if config.single_room_mode {
        info!("Single room mode: '{}' is the only room", config.band_name);
    } else {
        let _reaper = hub.rooms.spawn_reaper();
    }

    info!(
        "Transport port pool: {}-{}",
        config.transport_base_port,
        config.transport_base_port + config.transport_port_range - 1
    );

    let handle = ServerHandle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    run_server(hub.clone(), handle).await?;

    info!("Server stopped, destroying rooms...");
    hub.shutdown().await;
    info!("Goodbye");

    Ok(())
}

/// First SIGINT/SIGTERM drains the server gracefully; a second one gives up
/// and exits on the spot.
async fn shutdown_on_signal(handle: ServerHandle) {
    let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler installs");
    let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler installs");

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
    }

    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }

    warn!("Forced exit");
    process::exit(1);
}
