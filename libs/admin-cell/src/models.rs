use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Staff account as stored in the accounts table.
///
/// The password hash rides along for credential checks but is never
/// serialized into API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub is_admin: bool,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub must_change_password: bool,
    pub created_at: DateTime<Utc>,
}

/// New accounts start inactive and without the admin role; an
/// administrator flips both bits separately once the person is vetted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum AccountError {
    #[error("Account not found")]
    NotFound,

    #[error("An account with username {username} already exists")]
    UsernameExists { username: String },

    #[error("Operation not allowed on your own account")]
    OwnAccount,

    #[error("Current password is incorrect")]
    InvalidCredentials,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
