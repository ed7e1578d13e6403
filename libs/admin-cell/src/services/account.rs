use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{
    Account, AccountError, ChangePasswordRequest, CreateAccountRequest, UpdateProfileRequest,
};
use crate::services::password;
use crate::services::validation;

pub struct AccountService {
    supabase: SupabaseClient,
}

impl AccountService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn list_accounts(&self, auth_token: &str) -> Result<Vec<Account>, AccountError> {
        let path = "/rest/v1/accounts?order=username.asc";
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| AccountError::DatabaseError(e.to_string()))
            })
            .collect()
    }

    pub async fn get_account(
        &self,
        account_id: Uuid,
        auth_token: &str,
    ) -> Result<Account, AccountError> {
        let path = format!("/rest/v1/accounts?id=eq.{}", account_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        let row = result.first().ok_or(AccountError::NotFound)?;
        serde_json::from_value(row.clone()).map_err(|e| AccountError::DatabaseError(e.to_string()))
    }

    pub async fn create_account(
        &self,
        request: CreateAccountRequest,
        auth_token: &str,
    ) -> Result<Account, AccountError> {
        let username =
            validation::validate_username(&request.username).map_err(AccountError::ValidationError)?;
        let display_name = validation::sanitize_display_name(&request.display_name)
            .map_err(AccountError::ValidationError)?;
        password::validate_password_policy(&request.password)
            .map_err(AccountError::ValidationError)?;

        debug!("Creating account {}", username);

        // Friendly pre-check; the unique index on username is the authority
        let check_path = format!(
            "/rest/v1/accounts?username=eq.{}&select=id&limit=1",
            username
        );
        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &check_path, Some(auth_token), None)
            .await
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        if !existing.is_empty() {
            return Err(AccountError::UsernameExists { username });
        }

        let password_hash = password::hash_password(&request.password)
            .map_err(|e| AccountError::DatabaseError(format!("Password hashing failed: {}", e)))?;

        let account_data = json!({
            "id": Uuid::new_v4(),
            "username": username,
            "display_name": display_name,
            "password_hash": password_hash,
            "is_admin": false,
            "is_active": false,
            "must_change_password": false,
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/accounts",
                Some(auth_token),
                Some(account_data),
                Some(return_representation()),
            )
            .await
            .map_err(|e| {
                if shared_database::is_unique_violation(&e) {
                    AccountError::UsernameExists {
                        username: request.username.trim().to_string(),
                    }
                } else {
                    AccountError::DatabaseError(e.to_string())
                }
            })?;

        let row = result
            .first()
            .ok_or_else(|| AccountError::DatabaseError("Insert returned no row".to_string()))?;
        let account: Account = serde_json::from_value(row.clone())
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        info!("Account {} created for {}", account.id, account.username);
        Ok(account)
    }

    /// Replaces the target's password with a generated one and forces a
    /// change on next login. Returns the cleartext exactly once so the
    /// admin can hand it over; it is never stored or logged.
    pub async fn reset_password(
        &self,
        account_id: Uuid,
        actor_id: &str,
        auth_token: &str,
    ) -> Result<(Account, String), AccountError> {
        if account_id.to_string() == actor_id {
            return Err(AccountError::OwnAccount);
        }

        let target = self.get_account(account_id, auth_token).await?;

        let new_password = password::generate_password(password::GENERATED_PASSWORD_LENGTH);
        let password_hash = password::hash_password(&new_password)
            .map_err(|e| AccountError::DatabaseError(format!("Password hashing failed: {}", e)))?;

        let path = format!("/rest/v1/accounts?id=eq.{}", account_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({
                    "password_hash": password_hash,
                    "must_change_password": true,
                })),
                Some(return_representation()),
            )
            .await
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        let row = result.first().ok_or(AccountError::NotFound)?;
        let account: Account = serde_json::from_value(row.clone())
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        info!("Password reset issued for account {}", target.username);
        Ok((account, new_password))
    }

    pub async fn toggle_admin(
        &self,
        account_id: Uuid,
        actor_id: &str,
        auth_token: &str,
    ) -> Result<Account, AccountError> {
        if account_id.to_string() == actor_id {
            return Err(AccountError::OwnAccount);
        }

        let current = self.get_account(account_id, auth_token).await?;
        self.patch_account(account_id, json!({ "is_admin": !current.is_admin }), auth_token)
            .await
    }

    pub async fn toggle_active(
        &self,
        account_id: Uuid,
        actor_id: &str,
        auth_token: &str,
    ) -> Result<Account, AccountError> {
        if account_id.to_string() == actor_id {
            return Err(AccountError::OwnAccount);
        }

        let current = self.get_account(account_id, auth_token).await?;
        self.patch_account(account_id, json!({ "is_active": !current.is_active }), auth_token)
            .await
    }

    pub async fn update_profile(
        &self,
        account_id: Uuid,
        request: UpdateProfileRequest,
        auth_token: &str,
    ) -> Result<Account, AccountError> {
        let username =
            validation::validate_username(&request.username).map_err(AccountError::ValidationError)?;
        let display_name = validation::sanitize_display_name(&request.display_name)
            .map_err(AccountError::ValidationError)?;

        // Uniqueness check excludes the caller's own row so keeping the
        // current username is always allowed.
        let check_path = format!(
            "/rest/v1/accounts?username=eq.{}&id=neq.{}&select=id&limit=1",
            username, account_id
        );
        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &check_path, Some(auth_token), None)
            .await
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        if !existing.is_empty() {
            return Err(AccountError::UsernameExists { username });
        }

        let path = format!("/rest/v1/accounts?id=eq.{}", account_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({
                    "username": username,
                    "display_name": display_name,
                })),
                Some(return_representation()),
            )
            .await
            .map_err(|e| {
                if shared_database::is_unique_violation(&e) {
                    AccountError::UsernameExists {
                        username: request.username.trim().to_string(),
                    }
                } else {
                    AccountError::DatabaseError(e.to_string())
                }
            })?;

        let row = result.first().ok_or(AccountError::NotFound)?;
        serde_json::from_value(row.clone()).map_err(|e| AccountError::DatabaseError(e.to_string()))
    }

    pub async fn change_password(
        &self,
        account_id: Uuid,
        request: ChangePasswordRequest,
        auth_token: &str,
    ) -> Result<Account, AccountError> {
        let account = self.get_account(account_id, auth_token).await?;

        let current_matches =
            password::verify_password(&request.current_password, &account.password_hash)
                .map_err(|e| AccountError::DatabaseError(format!("Password check failed: {}", e)))?;
        if !current_matches {
            return Err(AccountError::InvalidCredentials);
        }

        password::validate_password_policy(&request.new_password)
            .map_err(AccountError::ValidationError)?;

        let password_hash = password::hash_password(&request.new_password)
            .map_err(|e| AccountError::DatabaseError(format!("Password hashing failed: {}", e)))?;

        self.patch_account(
            account_id,
            json!({
                "password_hash": password_hash,
                "must_change_password": false,
            }),
            auth_token,
        )
        .await
    }

    async fn patch_account(
        &self,
        account_id: Uuid,
        body: Value,
        auth_token: &str,
    ) -> Result<Account, AccountError> {
        let path = format!("/rest/v1/accounts?id=eq.{}", account_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await
            .map_err(|e| AccountError::DatabaseError(e.to_string()))?;

        let row = result.first().ok_or(AccountError::NotFound)?;
        serde_json::from_value(row.clone()).map_err(|e| AccountError::DatabaseError(e.to_string()))
    }
}
