// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{Datelike, NaiveDate, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    parse_date, parse_time, AppointmentError, BookAppointmentRequest, ListFilter,
    RescheduleAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct ListQueryParams {
    pub date: Option<String>,
    pub month: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub doctor_id: Uuid,
    pub date: String,
    pub time: String,
    pub exclude_appointment_id: Option<Uuid>,
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    tracing::info!("Appointment booking requested by {}", user.id);

    let booking_service = AppointmentBookingService::new(&state);

    let (appointment, notification) = booking_service
        .book_appointment(request, token)
        .await
        .map_err(|e| match e {
            AppointmentError::SlotConflict { .. } => AppError::Conflict(e.to_string()),
            AppointmentError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
            AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "notification": notification,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<ListQueryParams>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let filter = resolve_list_filter(&params)?;

    let booking_service = AppointmentBookingService::new(&state);

    let (appointments, tallies) = booking_service
        .list_appointments(filter, token)
        .await
        .map_err(|e| match e {
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "appointments": appointments,
        "tallies": tallies
    })))
}

#[axum::debug_handler]
pub async fn agenda(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    let appointments = booking_service
        .agenda(token)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({ "appointments": appointments })))
}

#[axum::debug_handler]
pub async fn check_availability(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<AvailabilityQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let date = parse_date(&query.date).map_err(|e| AppError::ValidationError(e.to_string()))?;
    let time = parse_time(&query.time).map_err(|e| AppError::ValidationError(e.to_string()))?;

    let booking_service = AppointmentBookingService::new(&state);

    let taken = booking_service
        .is_slot_taken(query.doctor_id, date, time, query.exclude_appointment_id, token)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "doctor_id": query.doctor_id,
        "date": date,
        "time": time.format("%H:%M:%S").to_string(),
        "taken": taken
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(|e| match e {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    tracing::info!("Appointment {} reschedule requested by {}", appointment_id, user.id);

    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .reschedule_appointment(appointment_id, request, token)
        .await
        .map_err(|e| match e {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::SlotConflict { .. } => AppError::Conflict(e.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    tracing::info!("Appointment {} deletion requested by {}", appointment_id, user.id);

    let booking_service = AppointmentBookingService::new(&state);

    booking_service
        .delete_appointment(appointment_id, token)
        .await
        .map_err(|e| match e {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            _ => AppError::Internal(e.to_string()),
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment deleted successfully"
    })))
}

/// Without explicit filters the index shows today, matching the front
/// desk's default view.
fn resolve_list_filter(params: &ListQueryParams) -> Result<ListFilter, AppError> {
    if let Some(date) = &params.date {
        let date = parse_date(date).map_err(|e| AppError::ValidationError(e.to_string()))?;
        return Ok(ListFilter::OnDate(date));
    }

    if let Some(month) = &params.month {
        let month_start = NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d")
            .map_err(|_| AppError::ValidationError(format!("Invalid month: {}", month)))?;
        return Ok(ListFilter::InMonth {
            year: month_start.year(),
            month: month_start.month(),
        });
    }

    Ok(ListFilter::OnDate(Utc::now().date_naive()))
}
