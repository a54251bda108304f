use std::borrow::BorrowMut;

use axum::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    modifiers(&Security),
    info(description = "jamhub exposes endpoints to manage users, rooms and audio routing on this hub"),
    paths(
        crate::auth::register,
        crate::auth::login,
        crate::auth::logout,
        crate::auth::user,
        crate::rooms::list_rooms,
        crate::rooms::create_room,
        crate::rooms::room,
        crate::rooms::join_room,
        crate::rooms::leave_room,
        crate::rooms::delete_room,
        crate::jack::graph,
        crate::jack::connect,
        crate::jack::disconnect,
        crate::users::list_users,
        crate::users::set_permissions,
        crate::health,
    )
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
