use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServerError;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterSchema {
    #[validate(length(min = 2, max = 64))]
    pub username: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginSchema {
    #[validate(length(max = 64))]
    pub username: String,
    #[validate(length(max = 128))]
    pub password: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewRoomSchema {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(length(min = 1, max = 128))]
    pub passphrase: Option<String>,
    #[validate(range(min = 1, max = 32))]
    pub max_participants: Option<u32>,
}

#[derive(Debug, Default, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRoomSchema {
    #[validate(length(max = 128))]
    pub passphrase: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeSchema {
    #[validate(length(min = 1, max = 256))]
    pub source: String,
    #[validate(length(min = 1, max = 256))]
    pub dest: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionsSchema {
    pub has_patchbay_access: bool,
}

/// Json body extractor that also runs the schema's validations
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|_| ServerError::Validation("could not read request body".to_string()))?;

        parse_and_validate(&bytes).map(Self)
    }
}

/// Like [ValidatedJson], but an absent body deserializes to the schema's
/// default. Join requests to public rooms carry no body at all.
pub struct OptionalJson<T>(pub T);

impl<S, T> FromRequest<S> for OptionalJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate + Default,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|_| ServerError::Validation("could not read request body".to_string()))?;

        if bytes.is_empty() {
            return Ok(Self(T::default()));
        }

        parse_and_validate(&bytes).map(Self)
    }
}

fn parse_and_validate<T>(bytes: &[u8]) -> Result<T, ServerError>
where
    T: DeserializeOwned + Validate,
{
    let value: T = serde_json::from_slice(bytes)
        .map_err(|e| ServerError::Validation(format!("malformed request body: {e}")))?;

    value
        .validate()
        .map_err(|_| ServerError::Validation("request body is invalid".to_string()))?;

    Ok(value)
}
