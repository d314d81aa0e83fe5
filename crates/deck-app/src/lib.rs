//! deck-app - Device registry, process lifecycle and orchestration for scrcpy-deck
//!
//! This crate owns the per-device state machine, the single-slot notification
//! bus, configuration loading, and the Engine that front-ends drive.

pub mod artifacts;
pub mod config;
pub mod deck_event;
pub mod engine;
pub mod lifecycle;
pub mod notification;
pub mod registry;
pub mod setup;

// Re-export primary types
pub use config::Settings;
pub use deck_event::DeckEvent;
pub use engine::{Engine, EVENT_CHANNEL_CAPACITY};
pub use lifecycle::{Outcome, ProcessLifecycleManager};
pub use notification::NotificationBus;
pub use registry::{DeviceDiff, DeviceRegistry};
pub use setup::validate_setup;

// Re-export bridge types for front-ends
pub use deck_bridge::{CommandGateway, ToolAvailability, ToolGateway, UnusableDevice};
