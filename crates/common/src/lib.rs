pub mod domain;
pub mod postgres;
pub mod telemetry;

pub use domain::*;

#[cfg(any(test, feature = "testing"))]
pub use domain::MockReadingRepository;
