pub mod supabase;

pub use supabase::{is_unique_violation, return_representation, SupabaseClient, SupabaseError};
