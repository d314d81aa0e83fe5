//! Headless mode - NDJSON event output for scripts and front-ends
//!
//! Every engine event is written to stdout as one JSON object per line with
//! an `event` tag and a millisecond `timestamp`. Commands are read from stdin,
//! one per line (see [`runner::Command`]).
//!
//! # Example Output
//!
//! ```json
//! {"event":"setup_checked","status":"ok","message":null,"timestamp":1704700001000}
//! {"event":"devices_changed","devices":[{"serial":"abc123","name":"abc123"}],"unusable":[],"added":["abc123"],"removed":[],"timestamp":1704700002000}
//! {"event":"status_changed","serial":"abc123","name":"abc123","status":"running","started_at":"2024-01-08T10:00:03+01:00","timestamp":1704700003000}
//! ```

pub mod runner;

use std::io::{self, Write};

use chrono::Utc;
use serde::Serialize;
use tracing::error;

use deck_app::{DeckEvent, UnusableDevice};
use deck_core::{DeviceContext, Message, ProcessStatus, SetupStatus};

/// A device as shown to headless clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub serial: String,
    pub name: String,
}

impl From<&DeviceContext> for DeviceSummary {
    fn from(ctx: &DeviceContext) -> Self {
        Self {
            serial: ctx.serial().to_string(),
            name: ctx.display_name().to_string(),
        }
    }
}

/// A device reported in a state that cannot be mirrored
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnusableSummary {
    pub serial: String,
    pub state: String,
}

impl From<&UnusableDevice> for UnusableSummary {
    fn from(device: &UnusableDevice) -> Self {
        Self {
            serial: device.device.serial.clone(),
            state: device.state.as_str().to_string(),
        }
    }
}

/// A device with its current process status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatusSummary {
    pub serial: String,
    pub name: String,
    pub status: &'static str,
    pub started_at: Option<String>,
    /// `HH:MM:SS` since `started_at`
    pub elapsed: Option<String>,
}

impl DeviceStatusSummary {
    fn new(ctx: &DeviceContext, status: &ProcessStatus) -> Self {
        Self {
            serial: ctx.serial().to_string(),
            name: ctx.display_name().to_string(),
            status: status.label(),
            started_at: status.started_at().map(|t| t.to_rfc3339()),
            elapsed: status
                .elapsed_at(chrono::Local::now())
                .map(deck_core::format_elapsed),
        }
    }
}

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Startup tool check; `message` is the banner text when a tool is missing
    SetupChecked {
        status: SetupStatus,
        message: Option<String>,
        timestamp: i64,
    },

    DevicesChanged {
        devices: Vec<DeviceSummary>,
        unusable: Vec<UnusableSummary>,
        added: Vec<String>,
        removed: Vec<String>,
        timestamp: i64,
    },

    DiscoveryUnavailable { reason: String, timestamp: i64 },

    StatusChanged {
        serial: String,
        name: String,
        status: &'static str,
        started_at: Option<String>,
        timestamp: i64,
    },

    /// Toast text; `kind` is `empty` when the toast was cleared
    Notification {
        kind: &'static str,
        serial: Option<String>,
        text: String,
        failure: bool,
        timestamp: i64,
    },

    /// Reply to a stdin command
    CommandResult {
        command: String,
        serial: Option<String>,
        ok: bool,
        outcome: Option<&'static str>,
        path: Option<String>,
        error: Option<String>,
        timestamp: i64,
    },

    /// Reply to the `devices` command
    Devices {
        devices: Vec<DeviceStatusSummary>,
        unusable: Vec<UnusableSummary>,
        timestamp: i64,
    },

    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },

    Shutdown { timestamp: i64 },
}

impl HeadlessEvent {
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn notification(message: &Message) -> Self {
        Self::Notification {
            kind: message_kind(message),
            serial: message.context().map(|ctx| ctx.serial().to_string()),
            text: message.text(),
            failure: message.is_failure(),
            timestamp: Self::now(),
        }
    }

    pub fn command_ok(
        command: &str,
        serial: Option<&str>,
        outcome: Option<&'static str>,
        path: Option<String>,
    ) -> Self {
        Self::CommandResult {
            command: command.to_string(),
            serial: serial.map(str::to_string),
            ok: true,
            outcome,
            path,
            error: None,
            timestamp: Self::now(),
        }
    }

    pub fn command_failed(command: &str, serial: Option<&str>, error: String) -> Self {
        Self::CommandResult {
            command: command.to_string(),
            serial: serial.map(str::to_string),
            ok: false,
            outcome: None,
            path: None,
            error: Some(error),
            timestamp: Self::now(),
        }
    }

    pub fn devices(
        statuses: &[(DeviceContext, ProcessStatus)],
        unusable: &[UnusableDevice],
    ) -> Self {
        Self::Devices {
            devices: statuses
                .iter()
                .map(|(ctx, status)| DeviceStatusSummary::new(ctx, status))
                .collect(),
            unusable: unusable.iter().map(UnusableSummary::from).collect(),
            timestamp: Self::now(),
        }
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            fatal,
            timestamp: Self::now(),
        }
    }
}

impl From<&DeckEvent> for HeadlessEvent {
    fn from(event: &DeckEvent) -> Self {
        let timestamp = HeadlessEvent::now();
        match event {
            DeckEvent::SetupChecked { status } => Self::SetupChecked {
                status: *status,
                message: status.error_message().map(str::to_string),
                timestamp,
            },
            DeckEvent::DevicesChanged {
                devices,
                unusable,
                added,
                removed,
            } => Self::DevicesChanged {
                devices: devices.iter().map(DeviceSummary::from).collect(),
                unusable: unusable.iter().map(UnusableSummary::from).collect(),
                added: added.iter().map(|c| c.serial().to_string()).collect(),
                removed: removed.iter().map(|c| c.serial().to_string()).collect(),
                timestamp,
            },
            DeckEvent::DiscoveryUnavailable { reason } => Self::DiscoveryUnavailable {
                reason: reason.clone(),
                timestamp,
            },
            DeckEvent::StatusChanged { context, status } => Self::StatusChanged {
                serial: context.serial().to_string(),
                name: context.display_name().to_string(),
                status: status.label(),
                started_at: status.started_at().map(|t| t.to_rfc3339()),
                timestamp,
            },
            DeckEvent::NotificationChanged { message } => Self::notification(message),
            DeckEvent::Shutdown => Self::Shutdown { timestamp },
        }
    }
}

fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::Empty => "empty",
        Message::SuccessToSaveScreenshot(_) => "success_to_save_screenshot",
        Message::FailedToSaveScreenshot(_) => "failed_to_save_screenshot",
        Message::StartRecordingMovie(_) => "start_recording_movie",
        Message::StopRecordingMovie(_) => "stop_recording_movie",
        Message::FailedRecordingMovie(_) => "failed_recording_movie",
        Message::FailedToStartMirroring(_) => "failed_to_start_mirroring",
        Message::MirroringExited(_) => "mirroring_exited",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_core::{ConnectionState, Device};
    use serde_json::Value;

    fn to_json(event: &HeadlessEvent) -> Value {
        serde_json::to_value(event).unwrap()
    }

    fn ctx(serial: &str) -> DeviceContext {
        DeviceContext::new(Device::new(serial))
    }

    #[test]
    fn test_setup_event_carries_banner() {
        let event = HeadlessEvent::from(&DeckEvent::SetupChecked {
            status: SetupStatus::MissingMirrorTool,
        });
        let json = to_json(&event);

        assert_eq!(json["event"], "setup_checked");
        assert_eq!(json["status"], "missing_mirror_tool");
        assert_eq!(json["message"], "Not found scrcpy command.");
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_devices_changed_flattens_contexts() {
        let event = HeadlessEvent::from(&DeckEvent::DevicesChanged {
            devices: vec![ctx("abc123").with_display_name("Pixel")],
            unusable: vec![UnusableDevice {
                device: Device::new("xyz789"),
                state: ConnectionState::Unauthorized,
            }],
            added: vec![ctx("abc123")],
            removed: vec![],
        });
        let json = to_json(&event);

        assert_eq!(json["event"], "devices_changed");
        assert_eq!(json["devices"][0]["serial"], "abc123");
        assert_eq!(json["devices"][0]["name"], "Pixel");
        assert_eq!(json["unusable"][0]["state"], "unauthorized");
        assert_eq!(json["added"][0], "abc123");
    }

    #[test]
    fn test_status_changed_labels() {
        let event = HeadlessEvent::from(&DeckEvent::StatusChanged {
            context: ctx("abc123"),
            status: ProcessStatus::running_now(),
        });
        let json = to_json(&event);

        assert_eq!(json["event"], "status_changed");
        assert_eq!(json["status"], "running");
        assert!(json["started_at"].is_string());
    }

    #[test]
    fn test_notification_text() {
        let event = HeadlessEvent::from(&DeckEvent::NotificationChanged {
            message: Message::SuccessToSaveScreenshot(ctx("abc123").with_display_name("Pixel")),
        });
        let json = to_json(&event);

        assert_eq!(json["event"], "notification");
        assert_eq!(json["kind"], "success_to_save_screenshot");
        assert_eq!(json["text"], "Success to save Pixel Screenshot!");
        assert_eq!(json["failure"], false);
    }

    #[test]
    fn test_cleared_notification() {
        let json = to_json(&HeadlessEvent::notification(&Message::Empty));
        assert_eq!(json["kind"], "empty");
        assert!(json["serial"].is_null());
    }

    #[test]
    fn test_devices_reply_includes_elapsed() {
        let statuses = vec![
            (ctx("a"), ProcessStatus::Idle),
            (ctx("b"), ProcessStatus::recording_now()),
        ];
        let json = to_json(&HeadlessEvent::devices(&statuses, &[]));

        assert_eq!(json["event"], "devices");
        assert_eq!(json["devices"][0]["status"], "idle");
        assert!(json["devices"][0]["elapsed"].is_null());
        assert_eq!(json["devices"][1]["status"], "recording");
        assert_eq!(json["devices"][1]["elapsed"], "00:00:00");
    }
}
