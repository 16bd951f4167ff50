pub mod collector;
pub mod domain;
pub mod ttn;

pub use collector::*;
pub use domain::*;
