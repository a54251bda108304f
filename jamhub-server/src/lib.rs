use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::{routing::get, Json, Router as AxumRouter};
use jamhub_hub::Hub;
use log::info;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

mod auth;
mod context;
mod docs;
mod errors;
mod jack;
mod rooms;
mod schemas;
mod serialized;
mod tls;
mod users;
mod ws;

pub use context::ServerContext;
pub use tls::TlsError;
pub use ws::PatchbaySockets;

/// Re-exported so the orchestrator can trigger graceful shutdown
pub use axum_server::Handle as ServerHandle;

use crate::serialized::Health;

type Router = AxumRouter<ServerContext>;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the server context for a hub. Exposed separately so tests can
/// drive the router without binding a socket.
pub fn context_for(hub: Arc<Hub>) -> ServerContext {
    ServerContext {
        hub,
        sockets: PatchbaySockets::new(),
    }
}

/// Assembles the full route table of the hub.
pub fn router(context: ServerContext) -> AxumRouter {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    AxumRouter::new()
        .nest("/auth", auth::router())
        .nest("/rooms", rooms::router())
        .nest("/jack", jack::router())
        .nest("/users", users::router())
        .route("/ws/patchbay", get(ws::patchbay_ws))
        .route("/health", get(health))
        .route("/api.json", get(docs::docs))
        .with_state(context)
        .layer(cors)
}

/// Serves the hub over TLS until the handle is shut down.
pub async fn run_server(hub: Arc<Hub>, handle: ServerHandle) -> Result<(), ServeError> {
    let context = context_for(hub.clone());

    // Fans hub events out to the patchbay subscribers
    tokio::spawn(ws::run_event_pump(context.clone()));

    let config = hub.config();
    let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, config.port).into();

    let tls = tls::load_or_generate(config).await?;

    info!("Listening on https://{}:{}", config.host, config.port);

    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(router(context).into_make_service())
        .await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, body = Health))
)]
pub(crate) async fn health(context: ServerContext) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_rooms: context.hub.rooms.list().len(),
        total_participants: context.hub.rooms.total_participants(),
    })
}
