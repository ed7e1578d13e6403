// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub reason: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Booking input as the presentation layer sends it. Date and time arrive
/// as raw form strings and are parsed before any store access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: String,
    pub time: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub date: String,
    pub time: String,
    pub reason: String,
    pub status: AppointmentStatus,
}

/// Listing window for the appointment index: one exact day or one month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    OnDate(NaiveDate),
    InMonth { year: i32, month: u32 },
}

/// Per-status counts over a filtered listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppointmentTallies {
    pub total: i64,
    pub scheduled: i64,
    pub completed: i64,
    pub cancelled: i64,
}

impl AppointmentTallies {
    pub fn from_appointments(appointments: &[Appointment]) -> Self {
        let mut tallies = Self {
            total: appointments.len() as i64,
            ..Self::default()
        };
        for appointment in appointments {
            match appointment.status {
                AppointmentStatus::Scheduled => tallies.scheduled += 1,
                AppointmentStatus::Completed => tallies.completed += 1,
                AppointmentStatus::Cancelled => tallies.cancelled += 1,
            }
        }
        tallies
    }
}

/// Outcome of the post-booking confirmation hand-off. Never fatal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    Sent,
    Failed,
    NoContact,
}

impl fmt::Display for NotificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationOutcome::Sent => write!(f, "sent"),
            NotificationOutcome::Failed => write!(f, "failed"),
            NotificationOutcome::NoContact => write!(f, "no_contact"),
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Slot already booked for {date} at {time}")]
    SlotConflict { date: NaiveDate, time: NaiveTime },

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

// ==============================================================================
// FORM-FIELD PARSING
// ==============================================================================

pub fn parse_date(raw: &str) -> Result<NaiveDate, AppointmentError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppointmentError::ValidationError(format!("Invalid date: {}", raw)))
}

/// Accepts `HH:MM` from forms and `HH:MM:SS` as the store renders it.
pub fn parse_time(raw: &str) -> Result<NaiveTime, AppointmentError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| AppointmentError::ValidationError(format!("Invalid time: {}", raw)))
}
