//! Configuration file parsing for scrcpy-deck
//!
//! Settings live in `<config_dir>/scrcpy-deck/config.toml` unless a path is
//! given on the command line.

pub mod settings;
pub mod types;

pub use settings::{default_config_path, load_settings, save_settings};
pub use types::*;
