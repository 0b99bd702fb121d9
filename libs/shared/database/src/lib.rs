pub mod collaborators;
pub mod supabase;

pub use collaborators::{AppointmentStore, CatalogStore, PaymentStore};
pub use supabase::SupabaseClient;
