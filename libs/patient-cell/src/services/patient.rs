use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{CreatePatientRequest, Patient, PatientError, UpdatePatientRequest};

const NAME_PATTERN: &str = r"^[a-zA-ZáéíóúÁÉÍÓÚñÑ\s'-]+$";
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";
const PHONE_PATTERN: &str = r"^\+?[\d][\d\s-]{5,18}$";
const NATIONAL_ID_PATTERN: &str = r"^[A-Za-z0-9\-]{6,20}$";

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn create_patient(
        &self,
        request: CreatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let national_id = validate_national_id(&request.national_id)?;
        let first_name = validate_name(&request.first_name, "first name")?;
        let last_name = validate_name(&request.last_name, "last name")?;
        let phone = request.phone.as_deref().map(validate_phone).transpose()?;
        let email = request.email.as_deref().map(validate_email).transpose()?;

        debug!("Creating patient record for national id {}", national_id);

        // Friendly pre-check; the unique index on national_id is the authority
        let check_path = format!(
            "/rest/v1/patients?national_id=eq.{}&select=id&limit=1",
            national_id
        );
        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &check_path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        if !existing.is_empty() {
            return Err(PatientError::NationalIdExists { national_id });
        }

        let patient_data = json!({
            "id": Uuid::new_v4(),
            "national_id": national_id,
            "first_name": first_name,
            "last_name": last_name,
            "phone": phone,
            "email": email,
            "birth_date": request.birth_date,
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/patients",
                Some(auth_token),
                Some(patient_data),
                Some(return_representation()),
            )
            .await
            .map_err(|e| {
                if shared_database::is_unique_violation(&e) {
                    PatientError::NationalIdExists {
                        national_id: request.national_id.trim().to_string(),
                    }
                } else {
                    PatientError::DatabaseError(e.to_string())
                }
            })?;

        let row = result
            .first()
            .ok_or_else(|| PatientError::DatabaseError("Insert returned no row".to_string()))?;
        let patient: Patient = serde_json::from_value(row.clone())
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        info!("Patient {} registered ({})", patient.id, patient.full_name());
        Ok(patient)
    }

    pub async fn get_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let row = result.first().ok_or(PatientError::NotFound)?;
        serde_json::from_value(row.clone()).map_err(|e| PatientError::DatabaseError(e.to_string()))
    }

    pub async fn list_patients(&self, auth_token: &str) -> Result<Vec<Patient>, PatientError> {
        let path = "/rest/v1/patients?order=first_name.asc,last_name.asc";
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| PatientError::DatabaseError(e.to_string()))
            })
            .collect()
    }

    pub async fn update_patient(
        &self,
        patient_id: Uuid,
        request: UpdatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
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
        if let Some(email) = request.email.as_deref() {
            update_data.insert("email".to_string(), json!(validate_email(email)?));
        }
        if let Some(birth_date) = request.birth_date {
            update_data.insert("birth_date".to_string(), json!(birth_date));
        }

        if update_data.is_empty() {
            return Err(PatientError::ValidationError(
                "No fields to update".to_string(),
            ));
        }

        debug!("Updating patient record {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
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
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let row = result.first().ok_or(PatientError::NotFound)?;
        serde_json::from_value(row.clone()).map_err(|e| PatientError::DatabaseError(e.to_string()))
    }

    pub async fn delete_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<(), PatientError> {
        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
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
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(PatientError::NotFound);
        }

        info!("Patient {} deleted", patient_id);
        Ok(())
    }
}

fn validate_name(value: &str, field: &str) -> Result<String, PatientError> {
    let trimmed = value.trim();
    if trimmed.len() < 2 || trimmed.len() > 100 {
        return Err(PatientError::ValidationError(format!(
            "The {} must be between 2 and 100 characters",
            field
        )));
    }
    let pattern = Regex::new(NAME_PATTERN).unwrap();
    if !pattern.is_match(trimmed) {
        return Err(PatientError::ValidationError(format!(
            "The {} contains invalid characters",
            field
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_email(value: &str) -> Result<String, PatientError> {
    let trimmed = value.trim();
    if trimmed.len() > 254 {
        return Err(PatientError::ValidationError(
            "Email address is too long".to_string(),
        ));
    }
    let pattern = Regex::new(EMAIL_PATTERN).unwrap();
    if !pattern.is_match(trimmed) {
        return Err(PatientError::ValidationError(
            "Email address is not valid".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_phone(value: &str) -> Result<String, PatientError> {
    let trimmed = value.trim();
    let pattern = Regex::new(PHONE_PATTERN).unwrap();
    if !pattern.is_match(trimmed) {
        return Err(PatientError::ValidationError(
            "Phone number is not valid".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

fn validate_national_id(value: &str) -> Result<String, PatientError> {
    let trimmed = value.trim();
    let pattern = Regex::new(NATIONAL_ID_PATTERN).unwrap();
    if !pattern.is_match(trimmed) {
        return Err(PatientError::ValidationError(
            "National id must be 6-20 alphanumeric characters with optional hyphens".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn accepts_accented_names() {
        assert_eq!(validate_name("  María José ", "first name").unwrap(), "María José");
        assert_eq!(validate_name("O'Brien-Núñez", "last name").unwrap(), "O'Brien-Núñez");
    }

    #[test]
    fn rejects_markup_in_names() {
        assert_matches!(
            validate_name("<script>alert(1)</script>", "first name"),
            Err(PatientError::ValidationError(_))
        );
        assert_matches!(validate_name("X", "first name"), Err(PatientError::ValidationError(_)));
    }

    #[test]
    fn validates_email_shape_and_length() {
        assert!(validate_email("maria@example.com").is_ok());
        assert_matches!(
            validate_email("not-an-email"),
            Err(PatientError::ValidationError(_))
        );
        let long = format!("{}@example.com", "a".repeat(250));
        assert_matches!(validate_email(&long), Err(PatientError::ValidationError(_)));
    }

    #[test]
    fn validates_phone_format() {
        assert!(validate_phone("+58 412 5551234").is_ok());
        assert!(validate_phone("0212-555-9876").is_ok());
        assert_matches!(validate_phone("call me"), Err(PatientError::ValidationError(_)));
    }

    #[test]
    fn validates_national_id_format() {
        assert!(validate_national_id("V-12345678").is_ok());
        assert_matches!(
            validate_national_id("12"),
            Err(PatientError::ValidationError(_))
        );
        assert_matches!(
            validate_national_id("id with spaces"),
            Err(PatientError::ValidationError(_))
        );
    }
}
