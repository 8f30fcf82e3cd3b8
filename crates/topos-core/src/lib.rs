//! Topos Core - Shared types, errors and configuration for cluster topology discovery

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;
