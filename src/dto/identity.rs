//! Caller identity forwarded by the external identity layer.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{dto::validation::validate_username, error::AppError, state::handle::Actor};

/// Header carrying the authenticated username.
pub const USERNAME_HEADER: &str = "x-username";
/// Header carrying the stable per-device identifier.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Extractor turning identity headers into an [`Actor`].
#[derive(Debug, Clone)]
pub struct Identity(pub Actor);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .filter(|value| !value.is_empty())
        };

        let username = header(USERNAME_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing `{USERNAME_HEADER}` header")))?;
        validate_username(&username)
            .map_err(|err| AppError::Unauthorized(format!("invalid username: {err}")))?;

        Ok(Identity(Actor::new(username, header(DEVICE_ID_HEADER))))
    }
}
