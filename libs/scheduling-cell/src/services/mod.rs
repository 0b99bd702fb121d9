pub mod availability;
pub mod clock;
pub mod conflict;
pub mod slots;
pub mod snapshot;

pub use availability::*;
pub use clock::*;
pub use conflict::*;
pub use slots::*;
pub use snapshot::*;
