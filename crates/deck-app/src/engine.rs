//! Engine - wires the registry, the lifecycle manager and the notification
//! bus together for a front-end.
//!
//! A front-end creates an [`Engine`], calls [`Engine::check_setup`] once,
//! [`Engine::start`] to begin polling, subscribes to [`DeckEvent`]s and
//! forwards user intents. [`Engine::shutdown`] terminates every process.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use deck_bridge::{ToolGateway, UnusableDevice};
use deck_core::prelude::*;
use deck_core::{DeviceContext, ProcessStatus, SetupStatus};

use crate::config::{save_settings, Settings};
use crate::deck_event::DeckEvent;
use crate::lifecycle::{Outcome, ProcessLifecycleManager};
use crate::notification::NotificationBus;
use crate::registry::{DeviceDiff, DeviceRegistry};
use crate::setup::validate_setup;

/// Capacity of the event broadcast channel; slow subscribers lag and skip
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// State shared with the background tasks
struct Shared<G: ToolGateway> {
    registry: Mutex<DeviceRegistry<G>>,
    manager: ProcessLifecycleManager<G>,
    events: broadcast::Sender<DeckEvent>,
    discovery_failing: AtomicBool,
}

impl<G> Shared<G>
where
    G: ToolGateway + Sync + 'static,
{
    fn emit(&self, event: DeckEvent) {
        let _ = self.events.send(event);
    }

    /// One discovery round: refresh, then attach/detach the difference.
    /// The registry lock is released before any device is torn down.
    async fn poll(&self) -> Result<DeviceDiff> {
        let (diff, devices, unusable, unusable_changed) = {
            let mut registry = self.registry.lock().await;
            let unusable_before = registry.unusable().to_vec();

            let diff = match registry.refresh().await {
                Ok(diff) => diff,
                Err(e) => {
                    if !self.discovery_failing.swap(true, Ordering::SeqCst) {
                        warn!("Device discovery unavailable: {}", e);
                        self.emit(DeckEvent::DiscoveryUnavailable {
                            reason: e.to_string(),
                        });
                    } else {
                        debug!("Device discovery still unavailable: {}", e);
                    }
                    return Err(e);
                }
            };

            let unusable = registry.unusable().to_vec();
            let unusable_changed = unusable != unusable_before;
            (diff, registry.snapshot(), unusable, unusable_changed)
        };
        if self.discovery_failing.swap(false, Ordering::SeqCst) {
            info!("Device discovery recovered");
        }

        let mut teardowns = JoinSet::new();
        for ctx in &diff.removed {
            let manager = self.manager.clone();
            let serial = ctx.serial().to_string();
            teardowns.spawn(async move {
                manager.detach(&serial).await;
            });
        }
        for ctx in &diff.added {
            self.manager.attach(ctx.clone());
        }
        while let Some(result) = teardowns.join_next().await {
            if let Err(e) = result {
                error!("Device teardown task failed: {}", e);
            }
        }

        if !diff.is_empty() || unusable_changed {
            self.emit(DeckEvent::DevicesChanged {
                devices,
                unusable,
                added: diff.added.clone(),
                removed: diff.removed.clone(),
            });
        }

        Ok(diff)
    }
}

pub struct Engine<G: ToolGateway> {
    gateway: Arc<G>,
    shared: Arc<Shared<G>>,
    settings: StdMutex<Settings>,
    config_path: Option<PathBuf>,
    shutdown_tx: watch::Sender<bool>,
    discovery: StdMutex<Option<JoinHandle<()>>>,
    forwarder: StdMutex<Option<JoinHandle<()>>>,
}

impl<G> Engine<G>
where
    G: ToolGateway + Sync + 'static,
{
    pub fn new(gateway: G, settings: Settings) -> Self {
        let gateway = Arc::new(gateway);
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);

        let manager = ProcessLifecycleManager::new(
            Arc::clone(&gateway),
            settings.clone(),
            NotificationBus::new(),
            events.clone(),
        );
        let registry = DeviceRegistry::with_names(Arc::clone(&gateway), settings.display_names());

        Self {
            gateway,
            shared: Arc::new(Shared {
                registry: Mutex::new(registry),
                manager,
                events,
                discovery_failing: AtomicBool::new(false),
            }),
            settings: StdMutex::new(settings),
            config_path: None,
            shutdown_tx,
            discovery: StdMutex::new(None),
            forwarder: StdMutex::new(None),
        }
    }

    /// Persist renames to this settings file
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeckEvent> {
        self.shared.events.subscribe()
    }

    pub fn notifications(&self) -> &NotificationBus {
        self.shared.manager.notifications()
    }

    pub fn manager(&self) -> &ProcessLifecycleManager<G> {
        &self.shared.manager
    }

    pub fn settings(&self) -> Settings {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run the tool check and emit [`DeckEvent::SetupChecked`]
    pub async fn check_setup(&self) -> SetupStatus {
        let status = validate_setup(self.gateway.as_ref()).await;
        match status.error_message() {
            Some(message) => error!("Setup check failed: {}", message),
            None => info!("Setup check passed"),
        }
        self.shared.emit(DeckEvent::SetupChecked { status });
        status
    }

    /// Run a single discovery round now
    pub async fn poll_devices(&self) -> Result<DeviceDiff> {
        self.shared.poll().await
    }

    /// Spawn the discovery loop and the notification forwarder
    pub fn start(&self) {
        let interval = self.settings().poll_interval();
        let discovery = tokio::spawn(discovery_loop(
            Arc::clone(&self.shared),
            interval,
            self.shutdown_tx.subscribe(),
        ));

        let mut messages = self.notifications().subscribe();
        let events = self.shared.events.clone();
        let forwarder = tokio::spawn(async move {
            while messages.changed().await.is_ok() {
                let message = messages.borrow_and_update().clone();
                let _ = events.send(DeckEvent::NotificationChanged { message });
            }
        });

        *self.discovery.lock().unwrap_or_else(PoisonError::into_inner) = Some(discovery);
        *self.forwarder.lock().unwrap_or_else(PoisonError::into_inner) = Some(forwarder);
        info!("Engine started (poll every {:?})", interval);
    }

    // ─────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────

    pub async fn devices(&self) -> Vec<DeviceContext> {
        self.shared.registry.lock().await.snapshot()
    }

    pub async fn unusable_devices(&self) -> Vec<UnusableDevice> {
        self.shared.registry.lock().await.unusable().to_vec()
    }

    pub fn statuses(&self) -> Vec<(DeviceContext, ProcessStatus)> {
        self.shared.manager.statuses()
    }

    // ─────────────────────────────────────────────────────────
    // Intents
    // ─────────────────────────────────────────────────────────

    pub async fn start_mirroring(&self, serial: &str) -> Result<Outcome> {
        self.shared.manager.start(serial).await
    }

    pub async fn stop_mirroring(&self, serial: &str) -> Result<Outcome> {
        self.shared.manager.stop(serial).await
    }

    pub async fn take_screenshot(&self, serial: &str) -> Result<PathBuf> {
        self.shared.manager.take_screenshot(serial).await
    }

    pub async fn start_recording(&self, serial: &str) -> Result<PathBuf> {
        self.shared.manager.start_recording(serial).await
    }

    pub async fn stop_recording(&self, serial: &str) -> Result<Outcome> {
        self.shared.manager.stop_recording(serial).await
    }

    /// Set or clear a device display name and persist it to the config file.
    /// Returns the updated context when the device is connected.
    pub async fn rename(
        &self,
        serial: &str,
        name: Option<String>,
    ) -> Result<Option<DeviceContext>> {
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let (renamed, devices, unusable) = {
            let mut registry = self.shared.registry.lock().await;
            let renamed = registry.rename(serial, name.clone());
            (renamed, registry.snapshot(), registry.unusable().to_vec())
        };

        match self.shared.manager.rename(serial, name.clone()) {
            Ok(_) | Err(Error::UnknownDevice { .. }) => {}
            Err(e) => return Err(e),
        }

        let settings = {
            let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
            settings.set_display_name(serial, name);
            settings.clone()
        };
        if let Some(path) = &self.config_path {
            save_settings(path, &settings)?;
        }

        if renamed.is_some() {
            self.shared.emit(DeckEvent::DevicesChanged {
                devices,
                unusable,
                added: Vec::new(),
                removed: Vec::new(),
            });
        }
        Ok(renamed)
    }

    /// Stop background tasks and terminate every process.
    ///
    /// A discovery round already in progress is allowed to finish, so a
    /// device it is tearing down is fully terminated before the remaining
    /// devices are.
    pub async fn shutdown(&self) {
        info!("Engine shutting down");
        let _ = self.shutdown_tx.send(true);

        let discovery = self
            .discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(discovery) = discovery {
            if let Err(e) = discovery.await {
                error!("Discovery loop failed: {}", e);
            }
        }

        self.shared.manager.shutdown().await;

        let forwarder = self
            .forwarder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(forwarder) = forwarder {
            forwarder.abort();
            let _ = forwarder.await;
        }

        self.shared.emit(DeckEvent::Shutdown);
    }
}

async fn discovery_loop<G>(
    shared: Arc<Shared<G>>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    G: ToolGateway + Sync + 'static,
{
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                // Errors are emitted by poll() and retried on the next tick
                let _ = shared.poll().await;
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    debug!("Discovery loop stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_bridge::test_utils::{FakeGateway, FakeKind};
    use deck_core::Message;
    use tempfile::TempDir;

    fn engine(gateway: &FakeGateway) -> (Engine<FakeGateway>, TempDir) {
        let temp = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.process.terminate_grace_ms = 100;
        settings.discovery.poll_interval_ms = 20;
        settings.output.screenshot_dir = Some(temp.path().join("shots"));
        settings.output.recording_dir = Some(temp.path().join("movies"));
        (Engine::new(gateway.clone(), settings), temp)
    }

    fn next_of(
        rx: &mut broadcast::Receiver<DeckEvent>,
        event_type: &str,
    ) -> Option<DeckEvent> {
        while let Ok(event) = rx.try_recv() {
            if event.event_type() == event_type {
                return Some(event);
            }
        }
        None
    }

    #[tokio::test]
    async fn test_check_setup_emits_event() {
        let gateway = FakeGateway::new();
        gateway.set_tools(true, false);
        let (engine, _temp) = engine(&gateway);
        let mut rx = engine.subscribe();

        assert_eq!(engine.check_setup().await, SetupStatus::MissingMirrorTool);

        match next_of(&mut rx, "setup_checked") {
            Some(DeckEvent::SetupChecked { status }) => {
                assert_eq!(status, SetupStatus::MissingMirrorTool)
            }
            other => panic!("expected SetupChecked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_poll_attaches_and_detaches() {
        let gateway = FakeGateway::new();
        gateway.set_devices(&["abc123"]);
        let (engine, _temp) = engine(&gateway);
        let mut rx = engine.subscribe();

        let diff = engine.poll_devices().await.unwrap();
        assert_eq!(diff.added.len(), 1);
        assert_eq!(engine.statuses().len(), 1);
        assert!(next_of(&mut rx, "devices_changed").is_some());

        engine.start_mirroring("abc123").await.unwrap();
        engine.start_recording("abc123").await.unwrap();

        gateway.set_devices(&[]);
        let diff = engine.poll_devices().await.unwrap();

        assert_eq!(diff.removed.len(), 1);
        assert!(engine.statuses().is_empty());
        assert_eq!(gateway.live_count("abc123", FakeKind::Mirror), 0);
        assert_eq!(gateway.live_count("abc123", FakeKind::Recording), 0);
    }

    #[tokio::test]
    async fn test_unchanged_poll_emits_nothing() {
        let gateway = FakeGateway::new();
        gateway.set_devices(&["abc123"]);
        let (engine, _temp) = engine(&gateway);
        engine.poll_devices().await.unwrap();
        let mut rx = engine.subscribe();

        let diff = engine.poll_devices().await.unwrap();

        assert!(diff.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_discovery_failure_reported_once() {
        let gateway = FakeGateway::new();
        gateway.set_devices(&["abc123"]);
        let (engine, _temp) = engine(&gateway);
        engine.poll_devices().await.unwrap();
        let mut rx = engine.subscribe();

        gateway.fail_discovery("adb hung");
        assert!(engine.poll_devices().await.is_err());
        assert!(engine.poll_devices().await.is_err());

        assert!(next_of(&mut rx, "discovery_unavailable").is_some());
        assert!(next_of(&mut rx, "discovery_unavailable").is_none());
        assert_eq!(engine.devices().await.len(), 1);
    }

    #[tokio::test]
    async fn test_background_loop_and_notifications() {
        let gateway = FakeGateway::new();
        gateway.set_devices(&["abc123"]);
        let (engine, _temp) = engine(&gateway);
        let mut rx = engine.subscribe();

        engine.start();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(engine.devices().await.len(), 1);

        engine.start_mirroring("abc123").await.unwrap();
        engine.take_screenshot("abc123").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut saw_notification = false;
        while let Ok(event) = rx.try_recv() {
            if let DeckEvent::NotificationChanged { message } = event {
                saw_notification |= matches!(message, Message::SuccessToSaveScreenshot(_));
            }
        }
        assert!(saw_notification);

        engine.shutdown().await;
        assert_eq!(gateway.live_count("abc123", FakeKind::Mirror), 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_disconnect_teardown() {
        let gateway = FakeGateway::new();
        gateway.set_devices(&["abc123"]);
        let (engine, _temp) = engine(&gateway);
        engine.start();
        tokio::time::sleep(Duration::from_millis(60)).await;
        engine.start_mirroring("abc123").await.unwrap();
        gateway.set_spawn_delay(Duration::from_millis(300));

        let (recorded, ()) = tokio::join!(engine.start_recording("abc123"), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            gateway.set_devices(&[]);
            // The loop sees the disconnect and waits on the in-flight recording
            tokio::time::sleep(Duration::from_millis(60)).await;
            engine.shutdown().await;
        });

        assert!(recorded.is_err());
        assert_eq!(gateway.live_count("abc123", FakeKind::Mirror), 0);
        assert_eq!(gateway.live_count("abc123", FakeKind::Recording), 0);
        assert!(engine.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_devices_answer_during_slow_teardown() {
        let gateway = FakeGateway::new();
        gateway.set_devices(&["abc123"]);
        let (engine, _temp) = engine(&gateway);
        engine.poll_devices().await.unwrap();
        gateway.set_spawn_delay(Duration::from_millis(300));

        let (started, diff, snapshot) = tokio::join!(
            engine.start_mirroring("abc123"),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                gateway.set_devices(&[]);
                engine.poll_devices().await
            },
            async {
                tokio::time::sleep(Duration::from_millis(60)).await;
                tokio::time::timeout(Duration::from_millis(50), engine.devices()).await
            }
        );

        assert!(started.is_err());
        assert_eq!(diff.unwrap().removed.len(), 1);
        let snapshot = snapshot.expect("devices() waited for the teardown");
        assert!(snapshot.is_empty());
        assert_eq!(gateway.live_count("abc123", FakeKind::Mirror), 0);
    }

    #[tokio::test]
    async fn test_rename_persists_to_config() {
        let gateway = FakeGateway::new();
        gateway.set_devices(&["abc123"]);
        let (engine, temp) = engine(&gateway);
        let config_path = temp.path().join("config.toml");
        let engine = engine.with_config_path(config_path.clone());
        engine.poll_devices().await.unwrap();

        let renamed = engine
            .rename("abc123", Some("Work phone".to_string()))
            .await
            .unwrap();

        assert_eq!(renamed.unwrap().display_name(), "Work phone");
        assert_eq!(
            engine.manager().context("abc123").unwrap().display_name(),
            "Work phone"
        );
        let saved = crate::config::load_settings(&config_path);
        assert_eq!(saved.display_name("abc123"), Some("Work phone"));
    }
}
