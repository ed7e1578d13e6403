// libs/appointment-cell/src/services/notify.rs
use serde_json::json;
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::{Appointment, NotificationOutcome};

/// Hands a booking confirmation to the configured webhook. Delivery itself
/// (mail, SMS, whatever sits behind the hook) is someone else's problem;
/// every outcome here is non-fatal to the booking.
pub struct ConfirmationNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl ConfirmationNotifier {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: config.notification_webhook_url.clone(),
        }
    }

    pub async fn send_confirmation(
        &self,
        appointment: &Appointment,
        patient_name: &str,
        patient_email: Option<&str>,
    ) -> NotificationOutcome {
        let email = match patient_email {
            Some(email) if !email.is_empty() => email,
            _ => {
                debug!(
                    "No contact on file for patient {}, skipping confirmation",
                    appointment.patient_id
                );
                return NotificationOutcome::NoContact;
            }
        };

        if self.webhook_url.is_empty() {
            warn!("Notification webhook not configured, confirmation not sent");
            return NotificationOutcome::Failed;
        }

        let payload = json!({
            "kind": "appointment_confirmation",
            "appointment_id": appointment.id,
            "patient_name": patient_name,
            "patient_email": email,
            "date": appointment.date,
            "time": appointment.time.format("%H:%M").to_string(),
            "reason": appointment.reason,
        });

        match self.client.post(&self.webhook_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(
                    "Confirmation for appointment {} handed to webhook",
                    appointment.id
                );
                NotificationOutcome::Sent
            }
            Ok(response) => {
                warn!(
                    "Confirmation webhook answered {} for appointment {}",
                    response.status(),
                    appointment.id
                );
                NotificationOutcome::Failed
            }
            Err(e) => {
                warn!(
                    "Confirmation webhook unreachable for appointment {}: {}",
                    appointment.id, e
                );
                NotificationOutcome::Failed
            }
        }
    }
}
