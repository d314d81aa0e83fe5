//! # deck-bridge - External Tool Gateway
//!
//! Wraps the two command-line tools the deck drives: `adb` for device
//! discovery and screenshots, `scrcpy` for mirroring and recording.
//!
//! Depends on [`deck_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Gateway
//! - [`ToolGateway`] - Discovery and spawn operations (async trait)
//! - [`ProcessHandle`] - Live process with `is_alive()` / `terminate()`
//! - [`CommandGateway`] - Implementation backed by the real tools
//!
//! ### Process Management
//! - [`ToolProcess`] - Supervised child process with graceful-then-forceful termination
//! - [`ExitSignal`] - Clonable exit observer
//!
//! ### Device Discovery
//! - [`list_devices()`] - Run `adb devices` with a timeout
//! - [`parse_device_list()`] - Parse `adb devices` output
//!
//! ### Tool Availability
//! - [`ToolAvailability`] - Resolve `adb` / `scrcpy` at startup
//! - [`ToolPaths`] - Configured command for each tool

pub mod devices;
pub mod gateway;
pub mod mirror;
pub mod process;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod tool_availability;

// Public API re-exports
pub use devices::{list_devices, parse_device_list, DeviceList, UnusableDevice, DEVICES_TIMEOUT};
pub use gateway::{
    CommandGateway, LocalProcessHandle, LocalToolGateway, ProcessHandle, ToolGateway,
    SCREENSHOT_TIMEOUT,
};
pub use mirror::{mirror_args, recording_args, screenshot_args, MirrorOptions};
pub use process::{ExitSignal, ToolProcess};
pub use tool_availability::{Tool, ToolAvailability, ToolPaths};
