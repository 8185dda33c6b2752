use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dto::validation::validate_username;

/// Body of `/signup` and `/login`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CredentialsRequest {
    #[validate(length(min = 3, max = 32), custom(function = "validate_username"))]
    pub username: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
}

/// Issued session; the same token is also set as the `tictac_session` cookie.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub username: String,
    pub token: String,
    /// Seconds until the session expires.
    pub expires_in: u64,
}
