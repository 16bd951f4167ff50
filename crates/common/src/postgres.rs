mod client;
mod config;
mod migration;
mod reading_repository;

pub use client::*;
pub use config::*;
pub use migration::*;
pub use reading_repository::*;
