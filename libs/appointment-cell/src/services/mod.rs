pub mod booking;
pub mod conflict;
pub mod notify;

pub use booking::AppointmentBookingService;
pub use conflict::SlotConflictGuard;
pub use notify::ConfirmationNotifier;
