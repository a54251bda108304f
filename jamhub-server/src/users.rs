use axum::{
    extract::Path,
    routing::{get, post},
    Json,
};
use jamhub_hub::{authorize, Action};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{PermissionsSchema, ValidatedJson},
    serialized::{ToSerialized, User},
    Router,
};

#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("BearerAuth" = [])),
    responses(
        (status = 200, body = Vec<User>),
        (status = 403, description = "Owner only")
    )
)]
pub(crate) async fn list_users(
    session: Session,
    context: ServerContext,
) -> ServerResult<Json<Vec<User>>> {
    authorize(&session.user, Action::ListUsers)?;

    let users = context.hub.auth.list_users().await?;

    Ok(Json(users.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/users/{id}/permissions",
    tag = "users",
    params(("id" = String, Path, description = "User id")),
    request_body = PermissionsSchema,
    security(("BearerAuth" = [])),
    responses(
        (status = 200, body = User),
        (status = 403, description = "Owner only"),
        (status = 404, description = "No such user")
    )
)]
pub(crate) async fn set_permissions(
    session: Session,
    context: ServerContext,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<PermissionsSchema>,
) -> ServerResult<Json<User>> {
    authorize(&session.user, Action::ManagePermissions)?;

    // Revoking the owner's access is silently refused by the store
    let user = context
        .hub
        .auth
        .set_patchbay_access(&id, body.has_patchbay_access)
        .await?;

    Ok(Json(user.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users))
        .route("/{id}/permissions", post(set_permissions))
}
