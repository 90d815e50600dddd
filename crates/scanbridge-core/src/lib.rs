//! # scanbridge core
//!
//! Shared configuration for the scanbridge binaries: the YAML
//! application config with per-subsystem sections and environment-
//! friendly defaults.

pub mod config;
pub mod error;

pub use config::AppConfig;
pub use error::{CoreError, Result};
