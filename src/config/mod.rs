//! Configuration Module

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::load_config_or_default;
pub use types::{BackendType, Config, DashboardConfig, QueueServiceConfig};
pub use validation::validate_config;
