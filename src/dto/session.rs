//! Payloads of the session-level endpoints.

use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::dto::validation::validate_username;

/// Remove a player from the session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct KickRequest {
    /// Player to remove.
    #[validate(custom(function = "validate_username"))]
    pub username: String,
}
