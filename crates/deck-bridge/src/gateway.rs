//! The tool gateway: the only place that talks to `adb` and `scrcpy`
//!
//! The lifecycle manager is generic over [`ToolGateway`] so tests can swap in
//! a scripted gateway without spawning real tools.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use deck_core::prelude::*;

use crate::devices::{self, DeviceList};
use crate::mirror::{self, MirrorOptions};
use crate::process::{ExitSignal, ToolProcess};
use crate::tool_availability::{self, Tool, ToolPaths};

/// Default upper bound for a single screenshot command
pub const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// A live external process owned by the lifecycle manager
#[trait_variant::make(ProcessHandle: Send)]
pub trait LocalProcessHandle {
    fn id(&self) -> Option<u32>;

    fn is_alive(&self) -> bool;

    /// Clonable exit observer, used to detect unexpected deaths
    fn exit_signal(&self) -> ExitSignal;

    /// Graceful-then-forceful termination bounded by `grace`
    async fn terminate(&mut self, grace: Duration) -> Result<()>;
}

impl ProcessHandle for ToolProcess {
    fn id(&self) -> Option<u32> {
        ToolProcess::id(self)
    }

    fn is_alive(&self) -> bool {
        ToolProcess::is_alive(self)
    }

    fn exit_signal(&self) -> ExitSignal {
        ToolProcess::exit_signal(self)
    }

    async fn terminate(&mut self, grace: Duration) -> Result<()> {
        ToolProcess::terminate(self, grace).await
    }
}

/// Device discovery and process spawning
#[trait_variant::make(ToolGateway: Send)]
pub trait LocalToolGateway {
    type Process: ProcessHandle + 'static;

    /// Current device set as reported by the discovery tool
    async fn list_devices(&self) -> Result<DeviceList>;

    async fn is_tool_available(&self, tool: Tool) -> bool;

    /// Start a mirror window for `serial`
    async fn spawn_mirror(&self, serial: &str, options: &MirrorOptions) -> Result<Self::Process>;

    /// Start a window-less recorder for `serial` writing to `path`
    async fn spawn_recording(&self, serial: &str, path: &Path) -> Result<Self::Process>;

    /// Capture one screenshot into `path`; succeeds iff the command exits 0
    async fn spawn_screenshot(&self, serial: &str, path: &Path) -> Result<()>;
}

/// [`ToolGateway`] backed by the real command-line tools
#[derive(Debug, Clone)]
pub struct CommandGateway {
    paths: ToolPaths,
    discovery_timeout: Duration,
    screenshot_timeout: Duration,
}

impl CommandGateway {
    pub fn new(paths: ToolPaths) -> Self {
        Self {
            paths,
            discovery_timeout: devices::DEVICES_TIMEOUT,
            screenshot_timeout: SCREENSHOT_TIMEOUT,
        }
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_screenshot_timeout(mut self, timeout: Duration) -> Self {
        self.screenshot_timeout = timeout;
        self
    }

    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }

    async fn run_screenshot(&self, serial: &str, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;

        let mut child = Command::new(&self.paths.adb)
            .args(mirror::screenshot_args(serial))
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found(&self.paths.adb)
                } else {
                    Error::spawn_failed(format!("screencap on {}: {}", serial, e))
                }
            })?;

        let status = timeout(self.screenshot_timeout, child.wait())
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("screenshot on {}", serial),
                    self.screenshot_timeout.as_millis() as u64,
                )
            })??;

        if status.success() {
            Ok(())
        } else {
            Err(Error::ProcessDied {
                code: status.code(),
            })
        }
    }
}

impl ToolGateway for CommandGateway {
    type Process = ToolProcess;

    async fn list_devices(&self) -> Result<DeviceList> {
        devices::list_devices(&self.paths.adb, self.discovery_timeout).await
    }

    async fn is_tool_available(&self, tool: Tool) -> bool {
        tool_availability::resolve(self.paths.get(tool)).is_some()
    }

    async fn spawn_mirror(&self, serial: &str, options: &MirrorOptions) -> Result<ToolProcess> {
        let args = mirror::mirror_args(serial, options);
        ToolProcess::spawn(&self.paths.scrcpy, &args, format!("scrcpy mirror {}", serial))
    }

    async fn spawn_recording(&self, serial: &str, path: &Path) -> Result<ToolProcess> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let args = mirror::recording_args(serial, path);
        ToolProcess::spawn(&self.paths.scrcpy, &args, format!("scrcpy record {}", serial))
    }

    async fn spawn_screenshot(&self, serial: &str, path: &Path) -> Result<()> {
        let result = self.run_screenshot(serial, path).await;
        if result.is_err() {
            // Do not leave a truncated PNG behind
            let _ = std::fs::remove_file(path);
        }
        result
    }
}
