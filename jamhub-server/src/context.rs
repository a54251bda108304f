use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jamhub_hub::Hub;

use crate::ws::PatchbaySockets;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub hub: Arc<Hub>,
    pub sockets: Arc<PatchbaySockets>,
}

impl FromRequestParts<ServerContext> for ServerContext {
    type Rejection = Infallible;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        Ok(state.clone())
    }
}
