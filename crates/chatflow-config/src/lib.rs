//! Configuration schema and file loading for the chatflow engine.
//!
//! This crate owns the config models (keyword sets, session options) and the
//! json5 file loader used by embedders of the engine.

mod error;
mod loader;
mod model;

/// Public error type returned by config loading APIs.
pub use error::ConfigError;
pub use loader::{default_config_path, load_config, load_config_or_default};
pub use model::*;
