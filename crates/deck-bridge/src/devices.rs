//! Device discovery using the `adb devices` command

use std::process::Stdio;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use deck_core::prelude::*;
use deck_core::{ConnectionState, Device};
use regex::Regex;
use tokio::process::Command;
use tokio::time::timeout;

/// Default timeout for the adb devices command
pub const DEVICES_TIMEOUT: Duration = Duration::from_secs(5);

/// `<serial>` then whitespace then `<state>`; the state may contain spaces
/// (`no permissions (...)`)
static DEVICE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)\s+(\S.*?)\s*$").expect("Invalid device line regex"));

const HEADER_PREFIX: &str = "List of devices";

/// A device adb can see but that cannot be mirrored yet
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct UnusableDevice {
    pub device: Device,
    pub state: ConnectionState,
}

/// Parsed result of one `adb devices` invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceList {
    /// Devices in the `device` state
    pub devices: Vec<Device>,

    /// Devices reported as `unauthorized`, `offline`, ...
    pub unusable: Vec<UnusableDevice>,
}

impl DeviceList {
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty() && self.unusable.is_empty()
    }
}

/// Run `adb devices` and parse the output.
///
/// Every failure (missing tool, hang, non-zero exit, unexpected output) is
/// returned as an error; nothing is silently dropped.
pub async fn list_devices(adb: &str, timeout_duration: Duration) -> Result<DeviceList> {
    let start = Instant::now();

    debug!("Discovering devices with {} devices", adb);

    let stdout = timeout(timeout_duration, run_adb_devices(adb))
        .await
        .map_err(|_| {
            Error::discovery_unavailable(format!(
                "adb devices timed out after {}ms",
                timeout_duration.as_millis()
            ))
        })??;

    let list = parse_device_list(&stdout)?;

    debug!(
        "Discovered {} usable / {} unusable devices in {:?}",
        list.devices.len(),
        list.unusable.len(),
        start.elapsed()
    );

    Ok(list)
}

/// Run the adb devices command and return its stdout
async fn run_adb_devices(adb: &str) -> Result<String> {
    let output = Command::new(adb)
        .arg("devices")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(adb)
            } else {
                Error::discovery_unavailable(format!("Failed to run adb devices: {}", e))
            }
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    trace!("adb devices stdout: {}", stdout);
    if !stderr.is_empty() {
        debug!("adb devices stderr: {}", stderr);
    }

    if !output.status.success() {
        return Err(Error::discovery_unavailable(format!(
            "adb devices failed with exit code {:?}: {}",
            output.status.code(),
            stderr.trim()
        )));
    }

    Ok(stdout)
}

/// Parse the tabular output of `adb devices`.
///
/// Output format:
/// ```text
/// * daemon not running; starting now at tcp:5037
/// * daemon started successfully
/// List of devices attached
/// emulator-5554	device
/// 0123456789ABCDEF	unauthorized
/// ```
pub fn parse_device_list(output: &str) -> Result<DeviceList> {
    let mut list = DeviceList::default();

    for line in output.lines() {
        let trimmed = line.trim_end();
        if trimmed.trim().is_empty()
            || trimmed.starts_with(HEADER_PREFIX)
            || trimmed.starts_with('*')
        {
            continue;
        }

        let caps = DEVICE_LINE
            .captures(trimmed)
            .ok_or_else(|| Error::malformed_device_list(trimmed))?;

        let device = Device::new(&caps[1]);
        let state = ConnectionState::parse(&caps[2]);

        if state.is_usable() {
            list.devices.push(device);
        } else {
            list.unusable.push(UnusableDevice { device, state });
        }
    }

    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_excludes_unauthorized() {
        let output = "List of devices attached\nabc123\tdevice\nxyz789\tunauthorized\n\n";

        let list = parse_device_list(output).unwrap();

        assert_eq!(list.devices, vec![Device::new("abc123")]);
        assert_eq!(list.unusable.len(), 1);
        assert_eq!(list.unusable[0].device, Device::new("xyz789"));
        assert_eq!(list.unusable[0].state, ConnectionState::Unauthorized);
    }

    #[test]
    fn test_parse_header_only() {
        let list = parse_device_list("List of devices attached\n\n").unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_parse_empty_output() {
        let list = parse_device_list("").unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_parse_skips_daemon_chatter() {
        let output = "* daemon not running; starting now at tcp:5037\n\
                      * daemon started successfully\n\
                      List of devices attached\n\
                      emulator-5554\tdevice\n";

        let list = parse_device_list(output).unwrap();
        assert_eq!(list.devices, vec![Device::new("emulator-5554")]);
    }

    #[test]
    fn test_parse_offline_and_other_states() {
        let output = "List of devices attached\n\
                      emulator-5554\toffline\n\
                      0123\tno permissions (user in plugdev group); see [http://developer.android.com/tools/device.html]\n";

        let list = parse_device_list(output).unwrap();

        assert!(list.devices.is_empty());
        assert_eq!(list.unusable[0].state, ConnectionState::Offline);
        assert!(matches!(
            &list.unusable[1].state,
            ConnectionState::Other(s) if s.starts_with("no permissions")
        ));
    }

    #[test]
    fn test_parse_windows_line_endings() {
        let output = "List of devices attached\r\nabc123\tdevice\r\n\r\n";
        let list = parse_device_list(output).unwrap();
        assert_eq!(list.devices, vec![Device::new("abc123")]);
    }

    #[test]
    fn test_parse_malformed_line_fails() {
        let output = "List of devices attached\nabc123\tdevice\ngarbage-without-state\n";
        let err = parse_device_list(output).unwrap_err();
        assert!(matches!(err, Error::MalformedDeviceList { ref line } if line == "garbage-without-state"));
    }

    #[test]
    fn test_parse_space_separated_lines() {
        let list =
            parse_device_list("List of devices attached\nabc123 device\nxyz789    offline\n")
                .unwrap();

        assert_eq!(list.devices, vec![Device::new("abc123")]);
        assert_eq!(list.unusable.len(), 1);
        assert_eq!(list.unusable[0].device.serial, "xyz789");
        assert_eq!(list.unusable[0].state, ConnectionState::Offline);
    }

    #[test]
    fn test_parse_line_without_state_fails() {
        let err = parse_device_list("List of devices attached\nabc123   \n").unwrap_err();
        assert!(matches!(err, Error::MalformedDeviceList { ref line } if line == "abc123"));
    }

    #[tokio::test]
    async fn test_list_devices_missing_tool() {
        let err = list_devices("scrcpy-deck-missing-adb", DEVICES_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }
}
