//! Test utilities for gateway consumers
//!
//! Provides a scripted [`FakeGateway`] whose processes are in-memory
//! [`FakeProcess`] handles, plus helpers for creating test contexts.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use deck_core::prelude::*;
use deck_core::{ConnectionState, Device, DeviceContext};

use crate::devices::{DeviceList, UnusableDevice};
use crate::gateway::{ProcessHandle, ToolGateway};
use crate::mirror::MirrorOptions;
use crate::process::ExitSignal;
use crate::tool_availability::Tool;

/// Creates a test context for `serial` with no custom name.
pub fn test_context(serial: &str) -> DeviceContext {
    DeviceContext::new(Device::new(serial))
}

/// Creates a device list where every serial is in the `device` state.
pub fn device_list(serials: &[&str]) -> DeviceList {
    DeviceList {
        devices: serials.iter().map(|s| Device::new(*s)).collect(),
        unusable: Vec::new(),
    }
}

static NEXT_FAKE_PID: AtomicU32 = AtomicU32::new(10_000);

/// Kind of process the fake gateway handed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeKind {
    Mirror,
    Recording,
}

/// In-memory process handle; alive until terminated or killed.
#[derive(Debug)]
pub struct FakeProcess {
    pid: u32,
    exit: ExitSignal,
}

impl ProcessHandle for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_alive(&self) -> bool {
        !self.exit.has_exited()
    }

    fn exit_signal(&self) -> ExitSignal {
        self.exit.clone()
    }

    async fn terminate(&mut self, _grace: Duration) -> Result<()> {
        self.exit.mark_exited(Some(0));
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Spawned {
    kind: FakeKind,
    serial: String,
    exit: ExitSignal,
}

#[derive(Debug, Default)]
struct FakeState {
    devices: DeviceList,
    discovery_error: Option<String>,
    adb_available: bool,
    scrcpy_available: bool,
    fail_mirror: bool,
    fail_recording: bool,
    fail_screenshot: bool,
    spawn_delay: Duration,
    spawned: Vec<Spawned>,
    screenshots: Vec<PathBuf>,
    recordings: Vec<PathBuf>,
    mirror_options: Vec<MirrorOptions>,
}

/// Scripted [`ToolGateway`] for tests. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct FakeGateway {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                adb_available: true,
                scrcpy_available: true,
                ..FakeState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake gateway state poisoned")
    }

    // ─────────────────────────────────────────────────────────
    // Scripting
    // ─────────────────────────────────────────────────────────

    pub fn set_devices(&self, serials: &[&str]) {
        let mut state = self.state();
        state.devices = device_list(serials);
        state.discovery_error = None;
    }

    pub fn set_unusable(&self, serial: &str, state: ConnectionState) {
        self.state().devices.unusable.push(UnusableDevice {
            device: Device::new(serial),
            state,
        });
    }

    pub fn fail_discovery(&self, reason: &str) {
        self.state().discovery_error = Some(reason.to_string());
    }

    pub fn set_tools(&self, adb: bool, scrcpy: bool) {
        let mut state = self.state();
        state.adb_available = adb;
        state.scrcpy_available = scrcpy;
    }

    pub fn fail_mirror_spawn(&self, fail: bool) {
        self.state().fail_mirror = fail;
    }

    pub fn fail_recording_spawn(&self, fail: bool) {
        self.state().fail_recording = fail;
    }

    pub fn fail_screenshot(&self, fail: bool) {
        self.state().fail_screenshot = fail;
    }

    /// Delay every spawn, keeping operations in flight long enough to race them
    pub fn set_spawn_delay(&self, delay: Duration) {
        self.state().spawn_delay = delay;
    }

    /// Simulate an unexpected exit of the newest live process of `kind`
    pub fn kill(&self, serial: &str, kind: FakeKind) -> bool {
        let state = self.state();
        let victim = state
            .spawned
            .iter()
            .rev()
            .find(|s| s.kind == kind && s.serial == serial && !s.exit.has_exited());
        match victim {
            Some(s) => {
                s.exit.mark_exited(Some(1));
                true
            }
            None => false,
        }
    }

    // ─────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────

    pub fn spawn_count(&self, kind: FakeKind) -> usize {
        self.state().spawned.iter().filter(|s| s.kind == kind).count()
    }

    pub fn live_count(&self, serial: &str, kind: FakeKind) -> usize {
        self.state()
            .spawned
            .iter()
            .filter(|s| s.kind == kind && s.serial == serial && !s.exit.has_exited())
            .count()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state().screenshots.clone()
    }

    pub fn recordings(&self) -> Vec<PathBuf> {
        self.state().recordings.clone()
    }

    pub fn last_mirror_options(&self) -> Option<MirrorOptions> {
        self.state().mirror_options.last().cloned()
    }

    async fn delay(&self) {
        let delay = self.state().spawn_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn spawn(&self, kind: FakeKind, serial: &str) -> FakeProcess {
        let process = FakeProcess {
            pid: NEXT_FAKE_PID.fetch_add(1, Ordering::Relaxed),
            exit: ExitSignal::new(),
        };
        self.state().spawned.push(Spawned {
            kind,
            serial: serial.to_string(),
            exit: process.exit.clone(),
        });
        process
    }
}

impl ToolGateway for FakeGateway {
    type Process = FakeProcess;

    async fn list_devices(&self) -> Result<DeviceList> {
        let state = self.state();
        match &state.discovery_error {
            Some(reason) => Err(Error::discovery_unavailable(reason.clone())),
            None => Ok(state.devices.clone()),
        }
    }

    async fn is_tool_available(&self, tool: Tool) -> bool {
        let state = self.state();
        match tool {
            Tool::Adb => state.adb_available,
            Tool::Scrcpy => state.scrcpy_available,
        }
    }

    async fn spawn_mirror(&self, serial: &str, options: &MirrorOptions) -> Result<FakeProcess> {
        self.delay().await;
        self.state().mirror_options.push(options.clone());
        if self.state().fail_mirror {
            return Err(Error::spawn_failed("scripted mirror failure"));
        }
        Ok(self.spawn(FakeKind::Mirror, serial))
    }

    async fn spawn_recording(&self, serial: &str, path: &Path) -> Result<FakeProcess> {
        self.delay().await;
        if self.state().fail_recording {
            return Err(Error::spawn_failed("scripted recording failure"));
        }
        self.state().recordings.push(path.to_path_buf());
        Ok(self.spawn(FakeKind::Recording, serial))
    }

    async fn spawn_screenshot(&self, _serial: &str, path: &Path) -> Result<()> {
        self.delay().await;
        if self.state().fail_screenshot {
            return Err(Error::ProcessDied { code: Some(1) });
        }
        self.state().screenshots.push(path.to_path_buf());
        Ok(())
    }
}
