//! Core domain type definitions

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Devices
// ─────────────────────────────────────────────────────────────────────────────

/// A device reported by the discovery tool, identified by its serial
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Device {
    pub serial: String,
}

impl Device {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
        }
    }
}

/// Connection state column of `adb devices`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Authorized and ready
    Device,
    Unauthorized,
    Offline,
    /// Anything else adb reports (`recovery`, `sideload`, `no permissions`, ...)
    Other(String),
}

impl ConnectionState {
    pub fn parse(state: &str) -> Self {
        match state {
            "device" => ConnectionState::Device,
            "unauthorized" => ConnectionState::Unauthorized,
            "offline" => ConnectionState::Offline,
            other => ConnectionState::Other(other.to_string()),
        }
    }

    /// Only fully connected devices can be mirrored
    pub fn is_usable(&self) -> bool {
        matches!(self, ConnectionState::Device)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConnectionState::Device => "device",
            ConnectionState::Unauthorized => "unauthorized",
            ConnectionState::Offline => "offline",
            ConnectionState::Other(s) => s,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device plus its user-facing name.
///
/// Equality and hashing only look at the serial, so renaming a device never
/// produces a second entry for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceContext {
    pub device: Device,

    /// User-assigned name; `None` displays the raw serial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
}

impl DeviceContext {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            custom_name: None,
        }
    }

    /// Builder: attach a custom display name (blank names are ignored)
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.set_display_name(Some(name.into()));
        self
    }

    pub fn serial(&self) -> &str {
        &self.device.serial
    }

    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.device.serial)
    }

    pub fn set_display_name(&mut self, name: Option<String>) {
        self.custom_name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
    }
}

impl From<Device> for DeviceContext {
    fn from(device: Device) -> Self {
        Self::new(device)
    }
}

impl PartialEq for DeviceContext {
    fn eq(&self, other: &Self) -> bool {
        self.device.serial == other.device.serial
    }
}

impl Eq for DeviceContext {}

impl Hash for DeviceContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.device.serial.hash(state);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Process Status
// ─────────────────────────────────────────────────────────────────────────────

/// Per-device state of the mirroring tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessStatus {
    /// No active process
    Idle,
    /// Spawn in flight
    Starting,
    /// Mirroring, not recording
    Running { started_at: DateTime<Local> },
    /// Mirroring and writing video
    Recording { started_at: DateTime<Local> },
    /// Termination in flight
    Stopping,
}

impl Default for ProcessStatus {
    fn default() -> Self {
        ProcessStatus::Idle
    }
}

impl ProcessStatus {
    pub fn running_now() -> Self {
        ProcessStatus::Running {
            started_at: Local::now(),
        }
    }

    pub fn recording_now() -> Self {
        ProcessStatus::Recording {
            started_at: Local::now(),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ProcessStatus::Idle)
    }

    /// A mirror session is up (with or without recording)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Running { .. } | ProcessStatus::Recording { .. }
        )
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, ProcessStatus::Recording { .. })
    }

    /// In-flight transition guard
    pub fn is_transient(&self) -> bool {
        matches!(self, ProcessStatus::Starting | ProcessStatus::Stopping)
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        match self {
            ProcessStatus::Running { started_at } | ProcessStatus::Recording { started_at } => {
                Some(*started_at)
            }
            ProcessStatus::Idle | ProcessStatus::Starting | ProcessStatus::Stopping => None,
        }
    }

    /// Time spent in the current stable state, measured against `now`.
    ///
    /// Clock skew (a `now` earlier than the start) yields zero.
    pub fn elapsed_at(&self, now: DateTime<Local>) -> Option<Duration> {
        self.started_at()
            .map(|start| (now - start).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProcessStatus::Idle => "idle",
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running { .. } => "running",
            ProcessStatus::Recording { .. } => "recording",
            ProcessStatus::Stopping => "stopping",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Format an elapsed duration as `HH:MM:SS`. Hours keep counting past 24.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────────────────────────

/// Transient notification shown as a toast
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "context", rename_all = "snake_case")]
pub enum Message {
    #[default]
    Empty,
    SuccessToSaveScreenshot(DeviceContext),
    FailedToSaveScreenshot(DeviceContext),
    StartRecordingMovie(DeviceContext),
    StopRecordingMovie(DeviceContext),
    FailedRecordingMovie(DeviceContext),
    FailedToStartMirroring(DeviceContext),
    MirroringExited(DeviceContext),
}

impl Message {
    pub fn is_empty(&self) -> bool {
        matches!(self, Message::Empty)
    }

    pub fn context(&self) -> Option<&DeviceContext> {
        match self {
            Message::Empty => None,
            Message::SuccessToSaveScreenshot(ctx)
            | Message::FailedToSaveScreenshot(ctx)
            | Message::StartRecordingMovie(ctx)
            | Message::StopRecordingMovie(ctx)
            | Message::FailedRecordingMovie(ctx)
            | Message::FailedToStartMirroring(ctx)
            | Message::MirroringExited(ctx) => Some(ctx),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Message::FailedToSaveScreenshot(_)
                | Message::FailedRecordingMovie(_)
                | Message::FailedToStartMirroring(_)
                | Message::MirroringExited(_)
        )
    }

    /// Text shown to the user
    pub fn text(&self) -> String {
        match self {
            Message::Empty => String::new(),
            Message::SuccessToSaveScreenshot(ctx) => {
                format!("Success to save {} Screenshot!", ctx.display_name())
            }
            Message::FailedToSaveScreenshot(ctx) => {
                format!("Failed to save {} Screenshot!", ctx.display_name())
            }
            Message::StartRecordingMovie(ctx) => {
                format!("Start recording movie on {}", ctx.display_name())
            }
            Message::StopRecordingMovie(ctx) => {
                format!("Stop recording movie on {}", ctx.display_name())
            }
            Message::FailedRecordingMovie(ctx) => {
                format!("Failed recording movie on {}", ctx.display_name())
            }
            Message::FailedToStartMirroring(ctx) => {
                format!("Failed to start mirroring {}", ctx.display_name())
            }
            Message::MirroringExited(ctx) => {
                format!("Mirroring on {} exited unexpectedly", ctx.display_name())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Setup
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of the one-shot startup check for the external tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStatus {
    Ok,
    MissingDiscoveryTool,
    MissingMirrorTool,
}

impl SetupStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, SetupStatus::Ok)
    }

    /// Persistent banner text, `None` when setup is complete
    pub fn error_message(&self) -> Option<&'static str> {
        match self {
            SetupStatus::Ok => None,
            SetupStatus::MissingDiscoveryTool => Some("Not found adb command."),
            SetupStatus::MissingMirrorTool => Some("Not found scrcpy command."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_connection_state_parse() {
        assert_eq!(ConnectionState::parse("device"), ConnectionState::Device);
        assert_eq!(
            ConnectionState::parse("unauthorized"),
            ConnectionState::Unauthorized
        );
        assert_eq!(ConnectionState::parse("offline"), ConnectionState::Offline);
        assert_eq!(
            ConnectionState::parse("recovery"),
            ConnectionState::Other("recovery".to_string())
        );
        assert!(ConnectionState::Device.is_usable());
        assert!(!ConnectionState::Unauthorized.is_usable());
    }

    #[test]
    fn test_context_display_name_defaults_to_serial() {
        let ctx = DeviceContext::new(Device::new("abc123"));
        assert_eq!(ctx.display_name(), "abc123");

        let ctx = ctx.with_display_name("Pixel 8");
        assert_eq!(ctx.display_name(), "Pixel 8");
        assert_eq!(ctx.serial(), "abc123");
    }

    #[test]
    fn test_context_blank_name_is_ignored() {
        let ctx = DeviceContext::new(Device::new("abc123")).with_display_name("   ");
        assert_eq!(ctx.display_name(), "abc123");
        assert!(ctx.custom_name.is_none());
    }

    #[test]
    fn test_context_equality_ignores_display_name() {
        let plain = DeviceContext::new(Device::new("abc123"));
        let renamed = plain.clone().with_display_name("Work phone");
        assert_eq!(plain, renamed);

        let mut set = HashSet::new();
        set.insert(plain);
        set.insert(renamed);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_status_predicates() {
        assert!(ProcessStatus::Idle.is_idle());
        assert!(ProcessStatus::Starting.is_transient());
        assert!(ProcessStatus::Stopping.is_transient());
        assert!(ProcessStatus::running_now().is_active());
        assert!(ProcessStatus::recording_now().is_active());
        assert!(ProcessStatus::recording_now().is_recording());
        assert!(!ProcessStatus::running_now().is_recording());
        assert!(ProcessStatus::Idle.started_at().is_none());
    }

    #[test]
    fn test_elapsed_is_derived_from_start() {
        let start = Local::now();
        let status = ProcessStatus::Running { started_at: start };
        let later = start + chrono::Duration::seconds(75);
        assert_eq!(status.elapsed_at(later), Some(Duration::from_secs(75)));
        assert_eq!(ProcessStatus::Idle.elapsed_at(later), None);
    }

    #[test]
    fn test_elapsed_clamps_clock_skew() {
        let start = Local::now();
        let status = ProcessStatus::Recording { started_at: start };
        let earlier = start - chrono::Duration::seconds(5);
        assert_eq!(status.elapsed_at(earlier), Some(Duration::ZERO));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(59)), "00:00:59");
        assert_eq!(format_elapsed(Duration::from_secs(3661)), "01:01:01");
        assert_eq!(format_elapsed(Duration::from_secs(100 * 3600)), "100:00:00");
    }

    #[test]
    fn test_message_text() {
        let ctx = DeviceContext::new(Device::new("abc")).with_display_name("Pixel");
        assert_eq!(
            Message::SuccessToSaveScreenshot(ctx.clone()).text(),
            "Success to save Pixel Screenshot!"
        );
        assert_eq!(
            Message::StopRecordingMovie(ctx.clone()).text(),
            "Stop recording movie on Pixel"
        );
        assert_eq!(Message::Empty.text(), "");
        assert!(Message::FailedRecordingMovie(ctx).is_failure());
    }

    #[test]
    fn test_message_serializes_with_kind_tag() {
        let ctx = DeviceContext::new(Device::new("abc"));
        let json = serde_json::to_value(Message::StartRecordingMovie(ctx)).unwrap();
        assert_eq!(json["kind"], "start_recording_movie");
        assert_eq!(json["context"]["device"]["serial"], "abc");
    }

    #[test]
    fn test_setup_status_messages() {
        assert!(SetupStatus::Ok.error_message().is_none());
        assert_eq!(
            SetupStatus::MissingDiscoveryTool.error_message(),
            Some("Not found adb command.")
        );
        assert_eq!(
            SetupStatus::MissingMirrorTool.error_message(),
            Some("Not found scrcpy command.")
        );
    }
}
