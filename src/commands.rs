//! One-shot CLI commands: `devices` and `check`

use serde::Serialize;

use deck_app::config::Settings;
use deck_bridge::{list_devices, Tool, ToolAvailability};
use deck_core::prelude::*;
use deck_core::SetupStatus;

use crate::headless::{DeviceSummary, UnusableSummary};

/// `scrcpy-deck devices` output
#[derive(Debug, Serialize)]
pub struct DeviceReport {
    pub devices: Vec<DeviceSummary>,
    pub unusable: Vec<UnusableSummary>,
}

/// List connected devices once, with configured display names applied
pub async fn device_report(settings: &Settings) -> Result<DeviceReport> {
    let configured = settings.tool_paths();
    let paths = ToolAvailability::check(&configured).resolved_paths(&configured);
    let list = list_devices(&paths.adb, settings.discovery_timeout()).await?;

    let devices = list
        .devices
        .into_iter()
        .map(|device| {
            let name = settings
                .display_name(&device.serial)
                .unwrap_or(&device.serial)
                .to_string();
            DeviceSummary {
                serial: device.serial,
                name,
            }
        })
        .collect();

    Ok(DeviceReport {
        devices,
        unusable: list.unusable.iter().map(UnusableSummary::from).collect(),
    })
}

/// Human-readable tool check; returns the setup outcome
pub fn check_tools(settings: &Settings) -> (SetupStatus, Vec<String>) {
    let configured = settings.tool_paths();
    let availability = ToolAvailability::check(&configured);

    let lines = [Tool::Adb, Tool::Scrcpy]
        .into_iter()
        .map(|tool| {
            let resolved = match tool {
                Tool::Adb => availability.adb.as_ref(),
                Tool::Scrcpy => availability.scrcpy.as_ref(),
            };
            match resolved {
                Some(path) => format!("{:<7} {}", tool.command_name(), path.display()),
                None => format!(
                    "{:<7} not found (configured: {})",
                    tool.command_name(),
                    configured.get(tool)
                ),
            }
        })
        .collect();

    (availability.setup_status(), lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tools_reports_missing() {
        let mut settings = Settings::default();
        settings.tools.adb_path = "/nonexistent/adb".to_string();
        settings.tools.scrcpy_path = "/nonexistent/scrcpy".to_string();

        let (status, lines) = check_tools(&settings);

        assert_eq!(status, SetupStatus::MissingDiscoveryTool);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("not found"));
        assert!(lines[1].contains("/nonexistent/scrcpy"));
    }
}
