use tracing::{info, warn};

use shared_models::auth::User;

/// Security-relevant account events go through here so the log always
/// carries both the acting user and the affected account.

pub fn account_created(actor: &User, target_username: &str) {
    info!(
        actor_id = %actor.id,
        target = %target_username,
        "AUDIT: account created"
    );
}

pub fn account_status_changed(actor: &User, target_username: &str, action: &str) {
    info!(
        actor_id = %actor.id,
        target = %target_username,
        action = %action,
        "AUDIT: account {}", action
    );
}

pub fn password_reset(actor: &User, target_username: &str) {
    warn!(
        actor_id = %actor.id,
        target = %target_username,
        "AUDIT: password reset by admin"
    );
}

pub fn password_changed(actor: &User) {
    info!(
        actor_id = %actor.id,
        "AUDIT: password changed"
    );
}

pub fn profile_updated(actor: &User, username: &str) {
    info!(
        actor_id = %actor.id,
        username = %username,
        "AUDIT: profile updated"
    );
}
