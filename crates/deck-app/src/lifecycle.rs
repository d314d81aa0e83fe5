//! Process lifecycle manager
//!
//! Owns every mirror and recording process and the per-device
//! [`ProcessStatus`] state machine:
//!
//! ```text
//! Idle -> Starting -> Running -> Stopping -> Idle
//! Running -> Starting -> Recording -> Stopping -> Running
//! ```
//!
//! Each device has its own slot guarded by an async mutex. User intents take
//! the slot with `try_lock` and fail with [`Error::Busy`] when another
//! operation on the same device is in flight. Teardown and exit supervision
//! wait for the slot instead. The map of entries is only locked long enough
//! to look up, insert or remove an entry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use chrono::Local;
use tokio::sync::{broadcast, watch, Mutex, MutexGuard};
use tokio::task::JoinSet;

use deck_bridge::{ExitSignal, ProcessHandle, ToolGateway};
use deck_core::prelude::*;
use deck_core::{DeviceContext, Message, ProcessStatus};

use crate::artifacts::{artifact_path, RECORDING_EXTENSION, SCREENSHOT_EXTENSION};
use crate::config::Settings;
use crate::deck_event::DeckEvent;
use crate::notification::NotificationBus;

/// Whether an intent changed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The device was already in the requested state
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessKind {
    Mirror,
    Recording,
}

impl ProcessKind {
    fn label(self) -> &'static str {
        match self {
            ProcessKind::Mirror => "mirror",
            ProcessKind::Recording => "recording",
        }
    }
}

/// A live process plus the token its exit watcher was registered with.
/// A watcher whose token no longer matches the slot lost a race with a
/// deliberate stop and does nothing.
struct Tracked<P> {
    token: u64,
    process: P,
}

struct Slot<P> {
    mirror: Option<Tracked<P>>,
    recording: Option<Tracked<P>>,
}

impl<P> Default for Slot<P> {
    fn default() -> Self {
        Self {
            mirror: None,
            recording: None,
        }
    }
}

struct DeviceEntry<P> {
    context: RwLock<DeviceContext>,
    status: watch::Sender<ProcessStatus>,
    /// Set by `detach`; in-flight operations tear down what they spawned
    removed: AtomicBool,
    slot: Mutex<Slot<P>>,
}

impl<P> DeviceEntry<P> {
    fn new(context: DeviceContext) -> Self {
        let (status, _rx) = watch::channel(ProcessStatus::Idle);
        Self {
            context: RwLock::new(context),
            status,
            removed: AtomicBool::new(false),
            slot: Mutex::new(Slot::default()),
        }
    }

    fn context(&self) -> DeviceContext {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_context(&self, context: DeviceContext) {
        *self
            .context
            .write()
            .unwrap_or_else(PoisonError::into_inner) = context;
    }

    fn status(&self) -> ProcessStatus {
        self.status.borrow().clone()
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}

struct Inner<G: ToolGateway> {
    gateway: Arc<G>,
    settings: Settings,
    entries: RwLock<HashMap<String, Arc<DeviceEntry<G::Process>>>>,
    bus: NotificationBus,
    events: broadcast::Sender<DeckEvent>,
    next_token: AtomicU64,
}

/// Owns all device processes. Cheap to clone; clones share state.
pub struct ProcessLifecycleManager<G: ToolGateway> {
    inner: Arc<Inner<G>>,
}

impl<G: ToolGateway> Clone for ProcessLifecycleManager<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

type Entry<G> = Arc<DeviceEntry<<G as ToolGateway>::Process>>;

impl<G> ProcessLifecycleManager<G>
where
    G: ToolGateway + Sync + 'static,
{
    pub fn new(
        gateway: Arc<G>,
        settings: Settings,
        bus: NotificationBus,
        events: broadcast::Sender<DeckEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                settings,
                entries: RwLock::new(HashMap::new()),
                bus,
                events,
                next_token: AtomicU64::new(1),
            }),
        }
    }

    pub fn notifications(&self) -> &NotificationBus {
        &self.inner.bus
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    // ─────────────────────────────────────────────────────────
    // Device entries
    // ─────────────────────────────────────────────────────────

    /// Start tracking a device in `Idle`. Returns false when it is already
    /// tracked, in which case only its context is refreshed.
    pub fn attach(&self, context: DeviceContext) -> bool {
        let serial = context.serial().to_string();
        let inserted = {
            let mut entries = self
                .inner
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match entries.get(&serial) {
                Some(existing) if !existing.is_removed() => {
                    existing.set_context(context.clone());
                    false
                }
                _ => {
                    entries.insert(serial, Arc::new(DeviceEntry::new(context.clone())));
                    true
                }
            }
        };

        if inserted {
            debug!("Tracking device {}", context.serial());
            self.emit(DeckEvent::StatusChanged {
                context,
                status: ProcessStatus::Idle,
            });
        }
        inserted
    }

    /// Tear a device down: mark it removed, wait for any in-flight
    /// operation, terminate every process it owns, then forget it.
    ///
    /// The teardown runs on its own task and completes even when the caller
    /// is cancelled. Calling again while an entry is still tracked repeats
    /// the teardown. Returns true when this call removed the entry.
    pub async fn detach(&self, serial: &str) -> bool {
        let entry = {
            let entries = self
                .inner
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            entries.get(serial).cloned()
        };
        let Some(entry) = entry else {
            return false;
        };
        entry.removed.store(true, Ordering::SeqCst);

        let manager = self.clone();
        let serial = serial.to_string();
        let task = tokio::spawn(async move { manager.finish_detach(&serial, entry).await });
        match task.await {
            Ok(removed) => removed,
            Err(e) => {
                error!("Device teardown task failed: {}", e);
                false
            }
        }
    }

    async fn finish_detach(&self, serial: &str, entry: Entry<G>) -> bool {
        let mut slot = entry.slot.lock().await;
        self.teardown(&entry, &mut slot).await;
        drop(slot);

        let removed = {
            let mut entries = self
                .inner
                .entries
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let current = entries
                .get(serial)
                .is_some_and(|current| Arc::ptr_eq(current, &entry));
            if current {
                entries.remove(serial);
            }
            current
        };
        if removed {
            info!("Detached device {}", serial);
        }
        removed
    }

    /// Detach every device, terminating all processes
    pub async fn shutdown(&self) {
        let serials: Vec<String> = self
            .inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();

        info!("Shutting down {} device(s)", serials.len());
        let mut tasks = JoinSet::new();
        for serial in serials {
            let manager = self.clone();
            tasks.spawn(async move {
                manager.detach(&serial).await;
            });
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Device teardown task failed: {}", e);
            }
        }
    }

    pub fn rename(&self, serial: &str, name: Option<String>) -> Result<DeviceContext> {
        let entry = self.entry(serial)?;
        let mut context = entry.context();
        context.set_display_name(name);
        entry.set_context(context.clone());
        Ok(context)
    }

    pub fn context(&self, serial: &str) -> Result<DeviceContext> {
        Ok(self.entry(serial)?.context())
    }

    pub fn status(&self, serial: &str) -> Result<ProcessStatus> {
        Ok(self.entry(serial)?.status())
    }

    /// Every tracked device with its status, ordered by serial
    pub fn statuses(&self) -> Vec<(DeviceContext, ProcessStatus)> {
        let entries: Vec<Entry<G>> = self
            .inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| !e.is_removed())
            .cloned()
            .collect();

        let mut statuses: Vec<_> = entries
            .iter()
            .map(|e| (e.context(), e.status()))
            .collect();
        statuses.sort_by(|a, b| a.0.serial().cmp(b.0.serial()));
        statuses
    }

    pub fn subscribe_status(&self, serial: &str) -> Result<watch::Receiver<ProcessStatus>> {
        Ok(self.entry(serial)?.status.subscribe())
    }

    // ─────────────────────────────────────────────────────────
    // Intents
    // ─────────────────────────────────────────────────────────

    /// Open a mirror window. Only valid from `Idle`; otherwise ignored.
    pub async fn start(&self, serial: &str) -> Result<Outcome> {
        let entry = self.entry(serial)?;
        let mut slot = Self::lock_for_intent(serial, &entry)?;

        let status = entry.status();
        if !status.is_idle() {
            debug!("start {} ignored while {}", serial, status);
            return Ok(Outcome::Ignored);
        }

        let context = entry.context();
        self.set_status(&entry, ProcessStatus::Starting);
        let options = self.inner.settings.mirror_options_for(&context);

        let mut process = match self.inner.gateway.spawn_mirror(serial, &options).await {
            Ok(process) => process,
            Err(e) => {
                warn!("Failed to start mirroring {}: {}", serial, e);
                self.set_status(&entry, ProcessStatus::Idle);
                self.inner
                    .bus
                    .publish(Message::FailedToStartMirroring(context));
                return Err(e);
            }
        };

        if entry.is_removed() {
            debug!("{} disconnected while its mirror was starting", serial);
            self.set_status(&entry, ProcessStatus::Stopping);
            self.terminate_process(serial, &mut process, ProcessKind::Mirror)
                .await;
            self.set_status(&entry, ProcessStatus::Idle);
            return Err(Error::unknown_device(serial));
        }

        info!("Mirroring {} (pid {:?})", serial, process.id());
        slot.mirror = Some(self.track(serial, ProcessKind::Mirror, process));
        self.set_status(&entry, ProcessStatus::running_now());
        Ok(Outcome::Applied)
    }

    /// Close the mirror window and any recording. Ignored from `Idle`.
    pub async fn stop(&self, serial: &str) -> Result<Outcome> {
        let entry = self.entry(serial)?;
        let mut slot = Self::lock_for_intent(serial, &entry)?;

        match entry.status() {
            ProcessStatus::Idle => return Ok(Outcome::Ignored),
            ProcessStatus::Starting | ProcessStatus::Stopping => {
                return Err(Error::busy(serial));
            }
            ProcessStatus::Running { .. } | ProcessStatus::Recording { .. } => {}
        }

        let context = entry.context();
        self.set_status(&entry, ProcessStatus::Stopping);

        let was_recording = match slot.recording.take() {
            Some(mut recording) => {
                self.terminate_process(serial, &mut recording.process, ProcessKind::Recording)
                    .await;
                true
            }
            None => false,
        };
        if let Some(mut mirror) = slot.mirror.take() {
            self.terminate_process(serial, &mut mirror.process, ProcessKind::Mirror)
                .await;
        }

        self.set_status(&entry, ProcessStatus::Idle);
        if was_recording {
            self.inner.bus.publish(Message::StopRecordingMovie(context));
        }
        info!("Stopped mirroring {}", serial);
        Ok(Outcome::Applied)
    }

    /// Capture a screenshot into the screenshot directory. Never changes
    /// the device status.
    pub async fn take_screenshot(&self, serial: &str) -> Result<PathBuf> {
        let entry = self.entry(serial)?;
        let slot = Self::lock_for_intent(serial, &entry)?;

        let mirror_live = slot
            .mirror
            .as_ref()
            .is_some_and(|m| m.process.is_alive());
        if self.inner.settings.process.screenshot_requires_mirror && !mirror_live {
            return Err(Error::invalid_transition(
                serial,
                entry.status().label(),
                "take a screenshot of",
            ));
        }

        let context = entry.context();
        let path = artifact_path(
            &self.inner.settings.screenshot_dir(),
            &context,
            Local::now(),
            SCREENSHOT_EXTENSION,
        );

        let result = self.inner.gateway.spawn_screenshot(serial, &path).await;
        drop(slot);

        match result {
            Ok(()) => {
                info!("Saved screenshot of {} to {:?}", serial, path);
                self.inner
                    .bus
                    .publish(Message::SuccessToSaveScreenshot(context));
                Ok(path)
            }
            Err(e) => {
                warn!("Screenshot of {} failed: {}", serial, e);
                self.inner
                    .bus
                    .publish(Message::FailedToSaveScreenshot(context));
                Err(e)
            }
        }
    }

    /// Start a recorder alongside the mirror. Only valid from `Running`.
    pub async fn start_recording(&self, serial: &str) -> Result<PathBuf> {
        let entry = self.entry(serial)?;
        let mut slot = Self::lock_for_intent(serial, &entry)?;

        let previous = entry.status();
        if !matches!(previous, ProcessStatus::Running { .. }) {
            return Err(Error::invalid_transition(
                serial,
                previous.label(),
                "start recording on",
            ));
        }

        let context = entry.context();
        let path = artifact_path(
            &self.inner.settings.recording_dir(),
            &context,
            Local::now(),
            RECORDING_EXTENSION,
        );
        self.set_status(&entry, ProcessStatus::Starting);

        let mut process = match self.inner.gateway.spawn_recording(serial, &path).await {
            Ok(process) => process,
            Err(e) => {
                warn!("Failed to start recording {}: {}", serial, e);
                self.set_status(&entry, previous);
                self.inner
                    .bus
                    .publish(Message::FailedRecordingMovie(context));
                return Err(e);
            }
        };

        if entry.is_removed() {
            debug!("{} disconnected while its recording was starting", serial);
            self.terminate_process(serial, &mut process, ProcessKind::Recording)
                .await;
            self.set_status(&entry, previous);
            return Err(Error::unknown_device(serial));
        }

        info!("Recording {} to {:?}", serial, path);
        slot.recording = Some(self.track(serial, ProcessKind::Recording, process));
        self.set_status(&entry, ProcessStatus::recording_now());
        self.inner
            .bus
            .publish(Message::StartRecordingMovie(context));
        Ok(path)
    }

    /// Stop the recorder and keep mirroring. Only valid from `Recording`.
    pub async fn stop_recording(&self, serial: &str) -> Result<Outcome> {
        let entry = self.entry(serial)?;
        let mut slot = Self::lock_for_intent(serial, &entry)?;

        let status = entry.status();
        if !status.is_recording() {
            return Err(Error::invalid_transition(
                serial,
                status.label(),
                "stop recording on",
            ));
        }

        let context = entry.context();
        self.set_status(&entry, ProcessStatus::Stopping);
        if let Some(mut recording) = slot.recording.take() {
            self.terminate_process(serial, &mut recording.process, ProcessKind::Recording)
                .await;
        }

        self.set_status(&entry, ProcessStatus::running_now());
        self.inner
            .bus
            .publish(Message::StopRecordingMovie(context));
        info!("Stopped recording {}", serial);
        Ok(Outcome::Applied)
    }

    // ─────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────

    fn entry(&self, serial: &str) -> Result<Entry<G>> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(serial)
            .filter(|e| !e.is_removed())
            .cloned()
            .ok_or_else(|| Error::unknown_device(serial))
    }

    fn lock_for_intent<'a>(
        serial: &str,
        entry: &'a DeviceEntry<G::Process>,
    ) -> Result<MutexGuard<'a, Slot<G::Process>>> {
        let slot = entry.slot.try_lock().map_err(|_| Error::busy(serial))?;
        if entry.is_removed() {
            return Err(Error::unknown_device(serial));
        }
        Ok(slot)
    }

    fn set_status(&self, entry: &DeviceEntry<G::Process>, status: ProcessStatus) {
        let previous = entry.status.send_replace(status.clone());
        let context = entry.context();
        debug!("{}: {} -> {}", context.serial(), previous, status);
        self.emit(DeckEvent::StatusChanged { context, status });
    }

    fn emit(&self, event: DeckEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    async fn teardown(&self, entry: &DeviceEntry<G::Process>, slot: &mut Slot<G::Process>) {
        let serial = entry.context().serial().to_string();
        let recording = slot.recording.take();
        let mirror = slot.mirror.take();

        if recording.is_some() || mirror.is_some() {
            self.set_status(entry, ProcessStatus::Stopping);
            if let Some(mut recording) = recording {
                self.terminate_process(&serial, &mut recording.process, ProcessKind::Recording)
                    .await;
            }
            if let Some(mut mirror) = mirror {
                self.terminate_process(&serial, &mut mirror.process, ProcessKind::Mirror)
                    .await;
            }
        }

        if !entry.status().is_idle() {
            self.set_status(entry, ProcessStatus::Idle);
        }
    }

    async fn terminate_process(&self, serial: &str, process: &mut G::Process, kind: ProcessKind) {
        let grace = self.inner.settings.terminate_grace();
        if let Err(e) = process.terminate(grace).await {
            warn!("Failed to terminate {} for {}: {}", kind.label(), serial, e);
        }
    }

    fn track(&self, serial: &str, kind: ProcessKind, process: G::Process) -> Tracked<G::Process> {
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        self.watch_exit(serial.to_string(), kind, token, process.exit_signal());
        Tracked { token, process }
    }

    fn watch_exit(&self, serial: String, kind: ProcessKind, token: u64, exit: ExitSignal) {
        let inner: Weak<Inner<G>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let code = exit.wait().await;
            if let Some(inner) = inner.upgrade() {
                ProcessLifecycleManager { inner }
                    .handle_exit(&serial, kind, token, code)
                    .await;
            }
        });
    }

    /// Reconcile the state machine after a tracked process exited on its own
    async fn handle_exit(&self, serial: &str, kind: ProcessKind, token: u64, code: Option<i32>) {
        let Ok(entry) = self.entry(serial) else {
            return;
        };
        let mut slot = entry.slot.lock().await;
        if entry.is_removed() {
            return;
        }

        let context = entry.context();
        match kind {
            ProcessKind::Mirror => {
                if !slot.mirror.as_ref().is_some_and(|m| m.token == token) {
                    return;
                }
                slot.mirror = None;

                let cut_recording = match slot.recording.take() {
                    Some(mut recording) => {
                        self.set_status(&entry, ProcessStatus::Stopping);
                        self.terminate_process(
                            serial,
                            &mut recording.process,
                            ProcessKind::Recording,
                        )
                        .await;
                        true
                    }
                    None => false,
                };
                self.set_status(&entry, ProcessStatus::Idle);

                if code == Some(0) && !cut_recording {
                    info!("Mirror window for {} closed", serial);
                } else {
                    warn!("Mirror for {} exited unexpectedly (code {:?})", serial, code);
                    self.inner.bus.publish(Message::MirroringExited(context));
                }
            }
            ProcessKind::Recording => {
                if !slot.recording.as_ref().is_some_and(|r| r.token == token) {
                    return;
                }
                slot.recording = None;

                warn!("Recording for {} exited unexpectedly (code {:?})", serial, code);
                self.set_status(&entry, ProcessStatus::running_now());
                self.inner
                    .bus
                    .publish(Message::FailedRecordingMovie(context));
            }
        }
    }
}
