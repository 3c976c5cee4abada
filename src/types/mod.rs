pub mod account;
pub mod order;
pub mod portfolio;
pub mod quote;

pub use account::*;
pub use order::*;
pub use portfolio::*;
pub use quote::*;
