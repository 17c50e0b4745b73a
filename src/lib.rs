pub mod adapters;
pub mod api;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod utils;

pub use crate::config::{CliArgs, TomlConfig};
pub use crate::core::orchestrator::Orchestrator;
pub use crate::utils::error::{Result, ScanError};
