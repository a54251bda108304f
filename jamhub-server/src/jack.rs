use axum::{
    routing::{get, post},
    Json,
};
use jamhub_hub::{authorize, Action};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{EdgeSchema, ValidatedJson},
    serialized::{EdgeResult, Graph, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/jack/graph",
    tag = "jack",
    security(("BearerAuth" = [])),
    responses((status = 200, body = Graph))
)]
pub(crate) async fn graph(session: Session, context: ServerContext) -> ServerResult<Json<Graph>> {
    authorize(&session.user, Action::ViewGraph)?;

    let snapshot = context.hub.patchbay().snapshot().await?;

    Ok(Json(snapshot.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/jack/connect",
    tag = "jack",
    request_body = EdgeSchema,
    security(("BearerAuth" = [])),
    responses(
        (status = 200, body = EdgeResult),
        (status = 403, description = "Patchbay access required"),
        (status = 409, description = "Ports are already connected")
    )
)]
pub(crate) async fn connect(
    session: Session,
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<EdgeSchema>,
) -> ServerResult<Json<EdgeResult>> {
    authorize(&session.user, Action::MutateGraph)?;

    context
        .hub
        .patchbay()
        .connect(&body.source, &body.dest)
        .await?;

    Ok(Json(EdgeResult {
        status: "ok",
        source: body.source,
        dest: body.dest,
    }))
}

#[utoipa::path(
    post,
    path = "/jack/disconnect",
    tag = "jack",
    request_body = EdgeSchema,
    security(("BearerAuth" = [])),
    responses(
        (status = 200, body = EdgeResult),
        (status = 403, description = "Patchbay access required"),
        (status = 409, description = "Ports are not connected")
    )
)]
pub(crate) async fn disconnect(
    session: Session,
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<EdgeSchema>,
) -> ServerResult<Json<EdgeResult>> {
    authorize(&session.user, Action::MutateGraph)?;

    context
        .hub
        .patchbay()
        .disconnect(&body.source, &body.dest)
        .await?;

    Ok(Json(EdgeResult {
        status: "ok",
        source: body.source,
        dest: body.dest,
    }))
}

pub fn router() -> Router {
    Router::new()
        .route("/graph", get(graph))
        .route("/connect", post(connect))
        .route("/disconnect", post(disconnect))
}
