pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use router::{booking_routes, BookingState};
pub use services::*;
