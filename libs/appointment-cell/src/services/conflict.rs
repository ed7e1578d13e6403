// libs/appointment-cell/src/services/conflict.rs
use chrono::{NaiveDate, NaiveTime};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;

/// Guards the booking invariant: at most one appointment per
/// (doctor, date, time) slot. Slots are exact-equality matches; duration
/// and overlap are not modeled.
pub struct SlotConflictGuard {
    supabase: Arc<SupabaseClient>,
}

impl SlotConflictGuard {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Checks whether any appointment already occupies the exact slot,
    /// optionally excluding one appointment id (used on reschedule so a
    /// record does not conflict with itself).
    ///
    /// The query does not filter on status: a cancelled appointment keeps
    /// its slot occupied and blocks rebooking of that date/time.
    ///
    /// This read is advisory. The store's unique index on
    /// (doctor_id, date, time) is what actually serializes concurrent
    /// writes; callers map its violation to `SlotConflict` as well.
    pub async fn is_slot_taken(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        excluding_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        debug!(
            "Checking slot for doctor {} on {} at {} (excluding {:?})",
            doctor_id, date, time, excluding_id
        );

        let time_str = time.format("%H:%M:%S").to_string();
        let mut query_parts = vec![
            format!("doctor_id=eq.{}", doctor_id),
            format!("date=eq.{}", date),
            format!("time=eq.{}", urlencoding::encode(&time_str)),
        ];

        if let Some(exclude_id) = excluding_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/appointments?{}&select=id&limit=1",
            query_parts.join("&")
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let taken = !result.is_empty();
        if taken {
            warn!(
                "Slot conflict for doctor {} on {} at {}",
                doctor_id, date, time
            );
        }

        Ok(taken)
    }
}
