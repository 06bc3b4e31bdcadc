pub mod checkout;
pub mod plan;

pub use checkout::*;
pub use plan::*;
