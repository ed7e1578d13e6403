// libs/appointment-cell/src/services/booking.rs
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{is_unique_violation, return_representation, SupabaseClient};

use crate::models::{
    parse_date, parse_time, Appointment, AppointmentError, AppointmentStatus, AppointmentTallies,
    BookAppointmentRequest, ListFilter, NotificationOutcome, RescheduleAppointmentRequest,
};
use crate::services::conflict::SlotConflictGuard;
use crate::services::notify::ConfirmationNotifier;

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    conflict_guard: SlotConflictGuard,
    notifier: ConfirmationNotifier,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let conflict_guard = SlotConflictGuard::new(Arc::clone(&supabase));
        let notifier = ConfirmationNotifier::new(config);

        Self {
            supabase,
            conflict_guard,
            notifier,
        }
    }

    /// Book a new appointment. Runs the advisory slot check, inserts with
    /// status `scheduled`, then hands off the confirmation notification.
    /// The store's unique index backstops the check: a concurrent insert
    /// that slips past it still comes back as a `SlotConflict`.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<(Appointment, NotificationOutcome), AppointmentError> {
        info!(
            "Booking appointment for patient {} with doctor {}",
            request.patient_id, request.doctor_id
        );

        let date = parse_date(&request.date)?;
        let time = parse_time(&request.time)?;
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(AppointmentError::ValidationError(
                "Reason is required".to_string(),
            ));
        }

        let patient = self.fetch_patient(request.patient_id, auth_token).await?;
        let doctor = self.fetch_doctor(request.doctor_id, auth_token).await?;

        if self
            .conflict_guard
            .is_slot_taken(request.doctor_id, date, time, None, auth_token)
            .await?
        {
            return Err(AppointmentError::SlotConflict { date, time });
        }

        let appointment = self
            .insert_appointment(request.patient_id, request.doctor_id, date, time, reason, auth_token)
            .await?;

        let patient_name = full_name(&patient);
        let patient_email = patient["email"].as_str();
        let outcome = self
            .notifier
            .send_confirmation(&appointment, &patient_name, patient_email)
            .await;

        info!(
            "Appointment {} booked with doctor {} {} (notification: {})",
            appointment.id,
            doctor["first_name"].as_str().unwrap_or(""),
            doctor["last_name"].as_str().unwrap_or(""),
            outcome
        );

        Ok((appointment, outcome))
    }

    /// Move or amend an existing appointment. The slot check excludes the
    /// appointment's own id so it never conflicts with itself.
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Rescheduling appointment: {}", appointment_id);

        let date = parse_date(&request.date)?;
        let time = parse_time(&request.time)?;
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(AppointmentError::ValidationError(
                "Reason is required".to_string(),
            ));
        }

        let current = self.get_appointment(appointment_id, auth_token).await?;

        if self
            .conflict_guard
            .is_slot_taken(current.doctor_id, date, time, Some(appointment_id), auth_token)
            .await?
        {
            return Err(AppointmentError::SlotConflict { date, time });
        }

        let update_data = json!({
            "date": date,
            "time": time.format("%H:%M:%S").to_string(),
            "reason": reason,
            "status": request.status.to_string(),
        });

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update_data),
                Some(return_representation()),
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppointmentError::SlotConflict { date, time }
                } else {
                    AppointmentError::DatabaseError(e.to_string())
                }
            })?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        let updated: Appointment = serde_json::from_value(result[0].clone()).map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse updated appointment: {}", e))
        })?;

        info!("Appointment {} rescheduled to {} {}", appointment_id, date, time);
        Ok(updated)
    }

    /// Expose the guard for the availability probe endpoint.
    pub async fn is_slot_taken(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: chrono::NaiveTime,
        excluding_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        self.conflict_guard
            .is_slot_taken(doctor_id, date, time, excluding_id, auth_token)
            .await
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        let appointment: Appointment = serde_json::from_value(result[0].clone()).map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
        })?;

        Ok(appointment)
    }

    pub async fn delete_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        debug!("Deleting appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
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
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    /// Day or month index with per-status tallies, newest first.
    pub async fn list_appointments(
        &self,
        filter: ListFilter,
        auth_token: &str,
    ) -> Result<(Vec<Appointment>, AppointmentTallies), AppointmentError> {
        debug!("Listing appointments with filter {:?}", filter);

        let window = match filter {
            ListFilter::OnDate(date) => format!("date=eq.{}", date),
            ListFilter::InMonth { year, month } => {
                let from = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
                    AppointmentError::ValidationError(format!("Invalid month: {}-{}", year, month))
                })?;
                let to = next_month_start(year, month);
                format!("date=gte.{}&date=lt.{}", from, to)
            }
        };

        let path = format!(
            "/rest/v1/appointments?{}&order=date.desc,time.desc",
            window
        );
        let appointments = self.fetch_appointments(&path, auth_token).await?;
        let tallies = AppointmentTallies::from_appointments(&appointments);

        Ok((appointments, tallies))
    }

    /// The working agenda: scheduled appointments only, newest first.
    pub async fn agenda(&self, auth_token: &str) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Fetching agenda");

        let path = format!(
            "/rest/v1/appointments?status=eq.{}&order=date.desc,time.desc",
            AppointmentStatus::Scheduled
        );
        self.fetch_appointments(&path, auth_token).await
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn insert_appointment(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: NaiveDate,
        time: chrono::NaiveTime,
        reason: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment_data = json!({
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "date": date,
            "time": time.format("%H:%M:%S").to_string(),
            "reason": reason,
            "status": AppointmentStatus::Scheduled.to_string(),
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(return_representation()),
            )
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppointmentError::SlotConflict { date, time }
                } else {
                    AppointmentError::DatabaseError(e.to_string())
                }
            })?;

        if result.is_empty() {
            return Err(AppointmentError::DatabaseError(
                "Failed to create appointment".to_string(),
            ));
        }

        serde_json::from_value(result[0].clone()).map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse created appointment: {}", e))
        })
    }

    async fn fetch_appointments(
        &self,
        path: &str,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })
    }

    async fn fetch_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Value, AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or(AppointmentError::PatientNotFound)
    }

    async fn fetch_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Value, AppointmentError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .next()
            .ok_or(AppointmentError::DoctorNotFound)
    }
}

fn full_name(row: &Value) -> String {
    format!(
        "{} {}",
        row["first_name"].as_str().unwrap_or(""),
        row["last_name"].as_str().unwrap_or("")
    )
    .trim()
    .to_string()
}

fn next_month_start(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    // Day 1 of a 1..=12 month always exists
    NaiveDate::from_ymd_opt(next_year, next_month, 1).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_window_rolls_over_december() {
        assert_eq!(
            next_month_start(2024, 12),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
        assert_eq!(
            next_month_start(2024, 3),
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
        );
    }

    #[test]
    fn full_name_tolerates_missing_fields() {
        let row = json!({"first_name": "Maria", "last_name": "Gonzalez"});
        assert_eq!(full_name(&row), "Maria Gonzalez");

        let row = json!({"first_name": "Maria"});
        assert_eq!(full_name(&row), "Maria");
    }
}
