use std::collections::BTreeSet;

use chrono::NaiveDate;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use appointment_cell::models::Appointment;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{HistoryError, PatientSummary};

/// Filters compose; absent fields widen the query.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
}

impl HistoryFilter {
    fn to_query(&self) -> String {
        let mut parts = vec!["status=in.(completed,cancelled)".to_string()];

        if let Some(from) = self.from {
            parts.push(format!("date=gte.{}", from.format("%Y-%m-%d")));
        }
        if let Some(to) = self.to {
            parts.push(format!("date=lte.{}", to.format("%Y-%m-%d")));
        }
        if let Some(patient_id) = self.patient_id {
            parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(doctor_id) = self.doctor_id {
            parts.push(format!("doctor_id=eq.{}", doctor_id));
        }

        parts.push("order=date.desc,time.desc".to_string());
        parts.join("&")
    }
}

pub struct HistoryService {
    supabase: SupabaseClient,
}

impl HistoryService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Terminal-state appointments only; active bookings never show up here.
    pub async fn query_history(
        &self,
        filter: HistoryFilter,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, HistoryError> {
        let path = format!("/rest/v1/appointments?{}", filter.to_query());
        debug!("History query: {}", path);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| HistoryError::DatabaseError(e.to_string()))
            })
            .collect()
    }

    /// Patients that have at least one appointment on record, for the
    /// history selector.
    pub async fn patients_with_appointments(
        &self,
        auth_token: &str,
    ) -> Result<Vec<PatientSummary>, HistoryError> {
        let refs: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                "/rest/v1/appointments?select=patient_id",
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        let ids: BTreeSet<String> = refs
            .iter()
            .filter_map(|row| row["patient_id"].as_str().map(str::to_string))
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let id_list = ids.into_iter().collect::<Vec<_>>().join(",");
        let path = format!(
            "/rest/v1/patients?id=in.({})&select=id,first_name,last_name&order=first_name.asc,last_name.asc",
            id_list
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| HistoryError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| HistoryError::DatabaseError(e.to_string()))
            })
            .collect()
    }
}
