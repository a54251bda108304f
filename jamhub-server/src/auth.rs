use std::ops::Deref;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
    routing::{get, post},
    Json,
};
use jamhub_hub::{Credentials, NewPlainUser, SessionData, UserData};

use crate::{
    context::ServerContext,
    errors::{ServerError, ServerResult},
    schemas::{LoginSchema, RegisterSchema, ValidatedJson},
    serialized::{AuthResult, StatusBody, ToSerialized, User},
    Router,
};

/// Wraps [SessionData] so [FromRequestParts] can be implemented for it
pub struct Session(SessionData);

impl Session {
    /// Returns the user of the session
    pub fn user(&self) -> UserData {
        self.user.clone()
    }
}

impl Deref for Session {
    type Target = SessionData;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequestParts<ServerContext> for Session {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerContext,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|x| x.to_str().ok())
            .ok_or(ServerError::MissingAuthorization)?;

        let parts: Vec<_> = header.split_ascii_whitespace().collect();

        if parts.first() != Some(&"Bearer") {
            return Err(ServerError::MissingAuthorization);
        }

        let token = parts.last().cloned().unwrap_or_default();

        let session = state
            .hub
            .auth
            .session(token)
            .await
            .map_err(|_| ServerError::InvalidToken)?;

        Ok(Self(session))
    }
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterSchema,
    responses(
        (status = 200, body = AuthResult),
        (status = 409, description = "Username is taken")
    )
)]
pub(crate) async fn register(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<RegisterSchema>,
) -> ServerResult<Json<AuthResult>> {
    let session = context
        .hub
        .auth
        .register(NewPlainUser {
            username: body.username,
            password: body.password,
            email: body.email,
        })
        .await?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginSchema,
    responses(
        (status = 200, body = AuthResult),
        (status = 401, description = "Invalid credentials")
    )
)]
pub(crate) async fn login(
    context: ServerContext,
    ValidatedJson(body): ValidatedJson<LoginSchema>,
) -> ServerResult<Json<AuthResult>> {
    let session = context
        .hub
        .auth
        .login(Credentials {
            username: body.username,
            password: body.password,
        })
        .await?;

    Ok(Json(session.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    security(("BearerAuth" = [])),
    responses((status = 200))
)]
pub(crate) async fn logout(
    context: ServerContext,
    session: Session,
) -> ServerResult<Json<StatusBody>> {
    context.hub.auth.logout(&session.token).await?;
    Ok(Json(StatusBody::ok()))
}

#[utoipa::path(
    get,
    path = "/auth/user",
    tag = "auth",
    security(("BearerAuth" = [])),
    responses((status = 200, body = User))
)]
pub(crate) async fn user(session: Session) -> Json<User> {
    Json(session.user().to_serialized())
}

pub fn router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/user", get(user))
}
