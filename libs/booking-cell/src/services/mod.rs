pub mod flow;
pub mod payment;
pub mod wizard;

pub use flow::*;
pub use payment::*;
pub use wizard::*;
