use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{CreateDoctorRequest, Doctor, DoctorError, UpdateDoctorRequest};

const NAME_PATTERN: &str = r"^[a-zA-ZáéíóúÁÉÍÓÚñÑ\s'-]+$";
const PHONE_PATTERN: &str = r"^\+?[\d][\d\s-]{5,18}$";
const NATIONAL_ID_PATTERN: &str = r"^[A-Za-z0-9\-]{6,20}$";

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn create_doctor(
        &self,
        request: CreateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        let national_id = validate_national_id(&request.national_id)?;
        let first_name = validate_name(&request.first_name, "first name")?;
        let last_name = validate_name(&request.last_name, "last name")?;
        let phone = request.phone.as_deref().map(validate_phone).transpose()?;

        debug!("Creating doctor record for national id {}", national_id);

        // Friendly pre-check; the unique index on national_id is the authority
        let check_path = format!(
            "/rest/v1/doctors?national_id=eq.{}&select=id&limit=1",
            national_id
        );
        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &check_path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        if !existing.is_empty() {
            return Err(DoctorError::NationalIdExists { national_id });
        }

        let doctor_data = json!({
            "id": Uuid::new_v4(),
            "national_id": national_id,
            "first_name": first_name,
            "last_name": last_name,
            "phone": phone,
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/doctors",
                Some(auth_token),
                Some(doctor_data),
                Some(return_representation()),
            )
            .await
            .map_err(|e| {
                if shared_database::is_unique_violation(&e) {
                    DoctorError::NationalIdExists {
                        national_id: request.national_id.trim().to_string(),
                    }
                } else {
                    DoctorError::DatabaseError(e.to_string())
                }
            })?;

        let row = result
            .first()
            .ok_or_else(|| DoctorError::DatabaseError("Insert returned no row".to_string()))?;
        let doctor: Doctor = serde_json::from_value(row.clone())
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        info!("Doctor {} registered ({})", doctor.id, doctor.full_name());
        Ok(doctor)
    }

    pub async fn get_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let row = result.first().ok_or(DoctorError::NotFound)?;
        serde_json::from_value(row.clone()).map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }

    pub async fn list_doctors(&self, auth_token: &str) -> Result<Vec<Doctor>, DoctorError> {
        let path = "/rest/v1/doctors?order=first_name.asc,last_name.asc";
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| DoctorError::DatabaseError(e.to_string()))
            })
            .collect()
    }

    /// Matches the fragment against first or last name, case-insensitively.
    pub async fn search_doctors(
        &self,
        term: &str,
        auth_token: &str,
    ) -> Result<Vec<Doctor>, DoctorError> {
        let term = validate_search_term(term)?;
        let encoded = urlencoding::encode(&term);

        debug!("Searching doctors by name fragment: {}", term);

        let path = format!(
            "/rest/v1/doctors?or=(first_name.ilike.*{}*,last_name.ilike.*{}*)&order=first_name.asc,last_name.asc",
            encoded, encoded
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| DoctorError::DatabaseError(e.to_string()))
            })
            .collect()
    }

    pub async fn update_doctor(
        &self,
        doctor_id: Uuid,
        request: UpdateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        let mut update_data = serde_json::Map::new();

        if let Some(first_name) = request.first_name.as_deref() {
            update_data.insert(
                "first_name".to_string(),
                json!(validate_name(first_name, "first name")?),
            );
        }
        if let Some(last_name) = request.last_name.as_deref() {
            update_data.insert(
                "last_name".to_string(),
                json!(validate_name(last_name, "last name")?),
            );
        }
        if let Some(phone) = request.phone.as_deref() {
            update_data.insert("phone".to_string(), json!(validate_phone(phone)?));
        }

        if update_data.is_empty() {
            return Err(DoctorError::ValidationError(
                "No fields to update".to_string(),
            ));
        }

        debug!("Updating doctor record {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update_data)),
                Some(return_representation()),
            )
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let row = result.first().ok_or(DoctorError::NotFound)?;
        serde_json::from_value(row.clone()).map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }

    pub async fn delete_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<(), DoctorError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(auth_token),
                None,
                Some(return_representation()),
            )
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(DoctorError::NotFound);
        }

        info!("Doctor {} deleted", doctor_id);
        Ok(())
    }
}

fn validate_name(value: &str, field: &str) -> Result<String, DoctorError> {
    let trimmed = value.trim();
    if trimmed.len() < 2 || trimmed.len() > 100 {
        return Err(DoctorError::ValidationError(format!(
            "The {} must be between 2 and 100 characters",
            field
        )));
    }
    let pattern = Regex::new(NAME_PATTERN).unwrap();
    if !pattern.is_match(trimmed) {
        return Err(DoctorError::ValidationError(format!(
            "The {} contains invalid characters",
            field
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_phone(value: &str) -> Result<String, DoctorError> {
    let trimmed = value.trim();
    let pattern = Regex::new(PHONE_PATTERN).unwrap();
    if !pattern.is_match(trimmed) {
        return Err(DoctorError::ValidationError(
            "Phone number is not valid".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_national_id(value: &str) -> Result<String, DoctorError> {
    let trimmed = value.trim();
    let pattern = Regex::new(NATIONAL_ID_PATTERN).unwrap();
    if !pattern.is_match(trimmed) {
        return Err(DoctorError::ValidationError(
            "National id must be 6-20 alphanumeric characters with optional hyphens".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Same alphabet as names so the fragment cannot smuggle filter syntax,
/// but a single character is enough to search by.
fn validate_search_term(value: &str) -> Result<String, DoctorError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > 100 {
        return Err(DoctorError::ValidationError(
            "Search term must be between 1 and 100 characters".to_string(),
        ));
    }
    let pattern = Regex::new(NAME_PATTERN).unwrap();
    if !pattern.is_match(trimmed) {
        return Err(DoctorError::ValidationError(
            "Search term contains invalid characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
