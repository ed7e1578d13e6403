pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::history_routes;
pub use services::{HistoryFilter, HistoryService};
