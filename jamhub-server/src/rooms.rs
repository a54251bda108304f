use axum::{
    extract::Path,
    routing::{get, post},
    Json,
};
use jamhub_hub::{authorize, Action, NewRoom};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{JoinRoomSchema, NewRoomSchema, OptionalJson, ValidatedJson},
    serialized::{JoinResult, RoomDetail, RoomSummary, StatusBody, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/rooms",
    tag = "rooms",
    security(("BearerAuth" = [])),
    responses((status = 200, body = Vec<RoomSummary>))
)]
pub(crate) async fn list_rooms(
    session: Session,
    context: ServerContext,
) -> ServerResult<Json<Vec<RoomSummary>>> {
    authorize(&session.user, Action::ListRooms)?;

    let rooms: Vec<_> = context
        .hub
        .rooms
        .list()
        .into_iter()
        .map(|r| r.to_serialized())
        .collect();

    Ok(Json(rooms))
}

#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = NewRoomSchema,
    security(("BearerAuth" = [])),
    responses(
        (status = 200, body = RoomDetail),
        (status = 403, description = "Room creation is disabled in single room mode"),
        (status = 503, description = "The transport port pool is exhausted")
    )
)]
pub(crate) async fn create_room(
    session: Session,
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<RoomDetail>> {
    authorize(&session.user, Action::CreateRoom)?;

    let room = context
        .hub
        .rooms
        .create(
            &session.user.id,
            NewRoom {
                name: body.name,
                passphrase: body.passphrase,
                max_participants: body.max_participants.map(|n| n as usize),
            },
        )
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = String, Path, description = "Room id")),
    security(("BearerAuth" = [])),
    responses(
        (status = 200, body = RoomDetail),
        (status = 404, description = "No such room")
    )
)]
pub(crate) async fn room(
    session: Session,
    context: ServerContext,
    Path(id): Path<String>,
) -> ServerResult<Json<RoomDetail>> {
    authorize(&session.user, Action::ListRooms)?;

    let room = context.hub.rooms.room_by_id(&id)?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/rooms/{id}/join",
    tag = "rooms",
    params(("id" = String, Path, description = "Room id")),
    request_body = JoinRoomSchema,
    security(("BearerAuth" = [])),
    responses(
        (status = 200, body = JoinResult),
        (status = 400, description = "Bad passphrase"),
        (status = 409, description = "Room is full")
    )
)]
pub(crate) async fn join_room(
    session: Session,
    context: ServerContext,
    Path(id): Path<String>,
    OptionalJson(body): OptionalJson<JoinRoomSchema>,
) -> ServerResult<Json<JoinResult>> {
    authorize(&session.user, Action::JoinRoom)?;

    let info = context
        .hub
        .rooms
        .join(&id, &session.user.id, body.passphrase.as_deref())
        .await?;

    Ok(Json(info.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/rooms/{id}/leave",
    tag = "rooms",
    params(("id" = String, Path, description = "Room id")),
    security(("BearerAuth" = [])),
    responses(
        (status = 200, body = StatusBody),
        (status = 404, description = "No such room")
    )
)]
pub(crate) async fn leave_room(
    session: Session,
    context: ServerContext,
    Path(id): Path<String>,
) -> ServerResult<Json<StatusBody>> {
    authorize(&session.user, Action::LeaveRoom)?;

    // Leaving a room the user is not in is an idempotent no-op
    context.hub.rooms.leave(&id, &session.user.id).await?;

    Ok(Json(StatusBody::ok()))
}

#[utoipa::path(
    delete,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = String, Path, description = "Room id")),
    security(("BearerAuth" = [])),
    responses(
        (status = 200, body = StatusBody),
        (status = 403, description = "Only the creator or the hub owner may delete a room")
    )
)]
pub(crate) async fn delete_room(
    session: Session,
    context: ServerContext,
    Path(id): Path<String>,
) -> ServerResult<Json<StatusBody>> {
    let user = session.user();

    context
        .hub
        .rooms
        .delete(&id, &user.id, user.is_owner)
        .await?;

    Ok(Json(StatusBody::ok()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms))
        .route("/", post(create_room))
        .route("/{id}", get(room))
        .route("/{id}", axum::routing::delete(delete_room))
        .route("/{id}/join", post(join_room))
        .route("/{id}/leave", post(leave_room))
}
