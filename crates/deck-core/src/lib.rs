//! # deck-core - Core Domain Types
//!
//! Foundation crate for scrcpy-deck. Provides domain types, error handling
//! and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, chrono, thiserror, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`Device`], [`DeviceContext`] - A discovered device and its display name
//! - [`ConnectionState`] - adb connection state column
//! - [`ProcessStatus`] - Per-device mirror/record state
//! - [`Message`] - Transient notification carried by the notification bus
//! - [`SetupStatus`] - Result of the startup tool check
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use deck_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod prelude;
pub mod types;

pub use error::{Error, Result, ResultExt};
pub use types::{
    format_elapsed, ConnectionState, Device, DeviceContext, Message, ProcessStatus, SetupStatus,
};
