//! Domain events emitted by the Engine for front-ends
//!
//! Front-ends call `Engine::subscribe()` and render from these events; they
//! never poll the manager directly.

use deck_bridge::UnusableDevice;
use deck_core::{DeviceContext, Message, ProcessStatus, SetupStatus};

/// Events broadcast by the Engine
#[derive(Debug, Clone)]
pub enum DeckEvent {
    // ─────────────────────────────────────────────────────────
    // Setup
    // ─────────────────────────────────────────────────────────
    /// One-shot tool check finished; non-Ok statuses carry a banner text
    SetupChecked { status: SetupStatus },

    // ─────────────────────────────────────────────────────────
    // Devices
    // ─────────────────────────────────────────────────────────
    /// The usable or unusable device set changed, or a device was renamed
    DevicesChanged {
        devices: Vec<DeviceContext>,
        unusable: Vec<UnusableDevice>,
        added: Vec<DeviceContext>,
        removed: Vec<DeviceContext>,
    },

    /// A discovery poll failed; the previous device set is kept
    DiscoveryUnavailable { reason: String },

    // ─────────────────────────────────────────────────────────
    // Processes
    // ─────────────────────────────────────────────────────────
    StatusChanged {
        context: DeviceContext,
        status: ProcessStatus,
    },

    // ─────────────────────────────────────────────────────────
    // Notifications
    // ─────────────────────────────────────────────────────────
    /// The current toast changed (`Message::Empty` when cleared)
    NotificationChanged { message: Message },

    /// Engine is shutting down; every process has been terminated
    Shutdown,
}

impl DeckEvent {
    /// Label for logging and the headless wire format
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SetupChecked { .. } => "setup_checked",
            Self::DevicesChanged { .. } => "devices_changed",
            Self::DiscoveryUnavailable { .. } => "discovery_unavailable",
            Self::StatusChanged { .. } => "status_changed",
            Self::NotificationChanged { .. } => "notification_changed",
            Self::Shutdown => "shutdown",
        }
    }
}
