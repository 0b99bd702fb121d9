pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod session;

pub use models::*;
pub use router::{appointment_routes, AppointmentState};
pub use services::*;
pub use session::{SessionContext, SessionStores};
