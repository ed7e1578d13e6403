use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::HistoryError;
use crate::services::{HistoryFilter, HistoryService};

/// Dates arrive as raw `YYYY-MM-DD` strings from the filter form.
#[derive(Debug, Deserialize)]
pub struct HistoryQueryParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
}

#[axum::debug_handler]
pub async fn query_history(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(params): Query<HistoryQueryParams>,
) -> Result<Json<Value>, AppError> {
    let filter = HistoryFilter {
        from: params.from.as_deref().map(parse_date).transpose()?,
        to: params.to.as_deref().map(parse_date).transpose()?,
        patient_id: params.patient_id,
        doctor_id: params.doctor_id,
    };

    let service = HistoryService::new(&state);
    let appointments = service
        .query_history(filter, auth.token())
        .await
        .map_err(|e| match e {
            HistoryError::ValidationError(msg) => AppError::ValidationError(msg),
            HistoryError::DatabaseError(msg) => AppError::Database(msg),
        })?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn patients_with_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = HistoryService::new(&state);
    let patients = service
        .patients_with_appointments(auth.token())
        .await
        .map_err(|e| match e {
            HistoryError::ValidationError(msg) => AppError::ValidationError(msg),
            HistoryError::DatabaseError(msg) => AppError::Database(msg),
        })?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::ValidationError(format!("Invalid date: {}", raw)))
}
