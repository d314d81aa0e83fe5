//! Configuration types for scrcpy-deck
//!
//! Defines `Settings`, the contents of `config.toml`, and its sections.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use deck_bridge::{MirrorOptions, ToolPaths};
use deck_core::DeviceContext;

/// Global application settings from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub tools: ToolSettings,

    #[serde(default)]
    pub discovery: DiscoverySettings,

    #[serde(default)]
    pub process: ProcessSettings,

    #[serde(default)]
    pub mirror: MirrorSettings,

    #[serde(default)]
    pub output: OutputSettings,

    #[serde(default)]
    pub ui: UiSettings,

    /// Per-device overrides keyed by serial
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceSettings>,
}

/// Where to find the external tools
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToolSettings {
    #[serde(default = "default_adb_path")]
    pub adb_path: String,

    #[serde(default = "default_scrcpy_path")]
    pub scrcpy_path: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            adb_path: default_adb_path(),
            scrcpy_path: default_scrcpy_path(),
        }
    }
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_scrcpy_path() -> String {
    "scrcpy".to_string()
}

/// Device discovery polling
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DiscoverySettings {
    /// Interval between `adb devices` polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for a single `adb devices` call
    #[serde(default = "default_discovery_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_discovery_timeout_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_discovery_timeout_ms() -> u64 {
    5000
}

/// Process supervision
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProcessSettings {
    /// Time a process gets to exit after SIGTERM before it is killed
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,

    #[serde(default = "default_screenshot_timeout_ms")]
    pub screenshot_timeout_ms: u64,

    /// Only allow screenshots while a mirror window is live
    #[serde(default = "default_true")]
    pub screenshot_requires_mirror: bool,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            terminate_grace_ms: default_terminate_grace_ms(),
            screenshot_timeout_ms: default_screenshot_timeout_ms(),
            screenshot_requires_mirror: true,
        }
    }
}

fn default_terminate_grace_ms() -> u64 {
    3000
}

fn default_screenshot_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

/// Mirror window defaults
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MirrorSettings {
    /// Use the device display name as the window title
    #[serde(default = "default_true")]
    pub window_title: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u32>,

    #[serde(default)]
    pub always_on_top: bool,

    /// Extra scrcpy flags appended verbatim
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            window_title: true,
            max_size: None,
            always_on_top: false,
            extra_args: Vec::new(),
        }
    }
}

/// Where artifacts are written
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OutputSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_dir: Option<PathBuf>,
}

/// Presentation preferences for front-ends
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UiSettings {
    #[serde(default = "default_true")]
    pub dark_mode: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self { dark_mode: true }
    }
}

/// `[devices.<serial>]`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DeviceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Overrides `mirror.max_size` for this device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u32>,
}

impl DeviceSettings {
    fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.max_size.is_none()
    }
}

impl Settings {
    pub fn tool_paths(&self) -> ToolPaths {
        ToolPaths {
            adb: self.tools.adb_path.clone(),
            scrcpy: self.tools.scrcpy_path.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.discovery.poll_interval_ms.max(1))
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery.timeout_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.process.terminate_grace_ms)
    }

    pub fn screenshot_timeout(&self) -> Duration {
        Duration::from_millis(self.process.screenshot_timeout_ms)
    }

    /// Screenshot directory, defaulting to `<pictures>/scrcpy-deck`
    pub fn screenshot_dir(&self) -> PathBuf {
        self.output
            .screenshot_dir
            .clone()
            .unwrap_or_else(|| default_output_dir(dirs::picture_dir()))
    }

    /// Recording directory, defaulting to `<videos>/scrcpy-deck`
    pub fn recording_dir(&self) -> PathBuf {
        self.output
            .recording_dir
            .clone()
            .unwrap_or_else(|| default_output_dir(dirs::video_dir()))
    }

    /// Configured display name for `serial`, if any
    pub fn display_name(&self, serial: &str) -> Option<&str> {
        self.devices
            .get(serial)
            .and_then(|d| d.display_name.as_deref())
    }

    /// All configured display names
    pub fn display_names(&self) -> BTreeMap<String, String> {
        self.devices
            .iter()
            .filter_map(|(serial, d)| Some((serial.clone(), d.display_name.clone()?)))
            .collect()
    }

    /// Store or clear a display name, dropping device sections that become empty
    pub fn set_display_name(&mut self, serial: &str, name: Option<String>) {
        let entry = self.devices.entry(serial.to_string()).or_default();
        entry.display_name = name;
        if entry.is_empty() {
            self.devices.remove(serial);
        }
    }

    /// Mirror options for one device: global defaults plus per-device overrides
    pub fn mirror_options_for(&self, ctx: &DeviceContext) -> MirrorOptions {
        let max_size = self
            .devices
            .get(ctx.serial())
            .and_then(|d| d.max_size)
            .or(self.mirror.max_size);

        let mut options = MirrorOptions {
            always_on_top: self.mirror.always_on_top,
            extra_args: self.mirror.extra_args.clone(),
            ..MirrorOptions::default()
        }
        .with_max_size(max_size);

        if self.mirror.window_title {
            options = options.with_window_title(ctx.display_name());
        }
        options
    }
}

fn default_output_dir(base: Option<PathBuf>) -> PathBuf {
    base.or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scrcpy-deck")
}
