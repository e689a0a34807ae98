//! Centralized configuration loading from config.toml.
//!
//! This crate provides configuration structs and loading logic shared
//! across the sente components.
//!
//! # Configuration Priority
//!
//! Settings are loaded with the following priority (highest to lowest):
//! 1. Environment variables (`SENTE_<SECTION>_<KEY>`)
//! 2. config.toml file
//! 3. Built-in defaults
//!
//! # Environment Variable Override Pattern
//!
//! ```text
//! SENTE_<SECTION>_<KEY>=value
//!
//! Examples:
//!     SENTE_COMMON_LOG_LEVEL=debug
//!     SENTE_ENGINE_BACKEND=gpu-compute
//!     SENTE_ENGINE_CACHE_CAPACITY=2000
//!     SENTE_RECOGNITION_OUTPUT_SIZE=640
//! ```

mod defaults;
mod loader;
mod structs;

pub use defaults::*;
pub use loader::{apply_env_overrides, load_config, load_from_path, CONFIG_SEARCH_PATHS};
pub use structs::*;

#[cfg(test)]
mod tests;
