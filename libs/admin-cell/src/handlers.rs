use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::require_admin;

use crate::models::{AccountError, ChangePasswordRequest, CreateAccountRequest, UpdateProfileRequest};
use crate::services::{audit, AccountService};

/// Self-service operations address the account behind the token.
fn own_account_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth("Token subject is not an account id".to_string()))
}

#[axum::debug_handler]
pub async fn list_accounts(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = AccountService::new(&config);
    let accounts = service
        .list_accounts(auth.token())
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({
        "accounts": accounts,
        "total": accounts.len()
    })))
}

#[axum::debug_handler]
pub async fn create_account(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    info!("User {} creating account {}", user.id, request.username);

    let service = AccountService::new(&config);
    let account = service
        .create_account(request, auth.token())
        .await
        .map_err(|e| match e {
            AccountError::UsernameExists { .. } => AppError::Conflict(e.to_string()),
            AccountError::ValidationError(msg) => AppError::ValidationError(msg),
            AccountError::DatabaseError(msg) => AppError::Database(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    audit::account_created(&user, &account.username);
    Ok(Json(json!(account)))
}

#[axum::debug_handler]
pub async fn reset_password(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = AccountService::new(&config);
    let (account, new_password) = service
        .reset_password(account_id, &user.id, auth.token())
        .await
        .map_err(|e| match e {
            AccountError::OwnAccount => {
                AppError::ValidationError("You cannot reset your own password".to_string())
            }
            AccountError::NotFound => AppError::NotFound("Account not found".to_string()),
            AccountError::DatabaseError(msg) => AppError::Database(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    audit::password_reset(&user, &account.username);

    // The cleartext leaves the system in this response and nowhere else.
    Ok(Json(json!({
        "success": true,
        "password": new_password
    })))
}

#[axum::debug_handler]
pub async fn toggle_admin(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = AccountService::new(&config);
    let account = service
        .toggle_admin(account_id, &user.id, auth.token())
        .await
        .map_err(|e| match e {
            AccountError::OwnAccount => {
                AppError::ValidationError("You cannot change your own admin role".to_string())
            }
            AccountError::NotFound => AppError::NotFound("Account not found".to_string()),
            AccountError::DatabaseError(msg) => AppError::Database(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    let action = if account.is_admin {
        "granted admin role"
    } else {
        "revoked admin role"
    };
    audit::account_status_changed(&user, &account.username, action);

    Ok(Json(json!(account)))
}

#[axum::debug_handler]
pub async fn toggle_active(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = AccountService::new(&config);
    let account = service
        .toggle_active(account_id, &user.id, auth.token())
        .await
        .map_err(|e| match e {
            AccountError::OwnAccount => {
                AppError::ValidationError("You cannot deactivate your own account".to_string())
            }
            AccountError::NotFound => AppError::NotFound("Account not found".to_string()),
            AccountError::DatabaseError(msg) => AppError::Database(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    let action = if account.is_active { "activated" } else { "deactivated" };
    audit::account_status_changed(&user, &account.username, action);

    Ok(Json(json!(account)))
}

#[axum::debug_handler]
pub async fn get_profile(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let account_id = own_account_id(&user)?;

    let service = AccountService::new(&config);
    let account = service
        .get_account(account_id, auth.token())
        .await
        .map_err(|e| match e {
            AccountError::NotFound => AppError::NotFound("Account not found".to_string()),
            AccountError::DatabaseError(msg) => AppError::Database(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!(account)))
}

#[axum::debug_handler]
pub async fn update_profile(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, AppError> {
    let account_id = own_account_id(&user)?;

    let service = AccountService::new(&config);
    let account = service
        .update_profile(account_id, request, auth.token())
        .await
        .map_err(|e| match e {
            AccountError::UsernameExists { .. } => AppError::Conflict(e.to_string()),
            AccountError::ValidationError(msg) => AppError::ValidationError(msg),
            AccountError::NotFound => AppError::NotFound("Account not found".to_string()),
            AccountError::DatabaseError(msg) => AppError::Database(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    audit::profile_updated(&user, &account.username);
    Ok(Json(json!(account)))
}

#[axum::debug_handler]
pub async fn change_password(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    let account_id = own_account_id(&user)?;

    let service = AccountService::new(&config);
    service
        .change_password(account_id, request, auth.token())
        .await
        .map_err(|e| match e {
            AccountError::InvalidCredentials => AppError::ValidationError(e.to_string()),
            AccountError::ValidationError(msg) => AppError::ValidationError(msg),
            AccountError::NotFound => AppError::NotFound("Account not found".to_string()),
            AccountError::DatabaseError(msg) => AppError::Database(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    audit::password_changed(&user);

    Ok(Json(json!({
        "success": true,
        "message": "Password updated"
    })))
}
