pub mod catalog;
pub mod invoice;
pub mod lifecycle;
pub mod notifications;

pub use catalog::*;
pub use invoice::*;
pub use lifecycle::*;
pub use notifications::*;
