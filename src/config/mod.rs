//! Configuration module.
//!
//! Handles loading and validating token pipeline configuration from TOML
//! files, and loading the master secret.

mod settings;

pub use settings::*;
