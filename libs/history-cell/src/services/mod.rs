pub mod history;

pub use history::{HistoryFilter, HistoryService};
