//! Device registry: the set of usable devices, refreshed by polling
//!
//! Each `refresh()` asks the gateway for the current device list and diffs
//! it against the previously known set. Failures never touch the known set.

use std::collections::BTreeMap;
use std::sync::Arc;

use deck_bridge::{ToolGateway, UnusableDevice};
use deck_core::prelude::*;
use deck_core::DeviceContext;

/// Result of one successful refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDiff {
    /// Devices that appeared since the last refresh
    pub added: Vec<DeviceContext>,

    /// Devices that disappeared since the last refresh
    pub removed: Vec<DeviceContext>,
}

impl DeviceDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub struct DeviceRegistry<G> {
    gateway: Arc<G>,
    known: BTreeMap<String, DeviceContext>,
    unusable: Vec<UnusableDevice>,
    /// Display names by serial; survive a device disconnecting
    names: BTreeMap<String, String>,
}

impl<G: ToolGateway> DeviceRegistry<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self::with_names(gateway, BTreeMap::new())
    }

    /// Registry with display names seeded from configuration
    pub fn with_names(gateway: Arc<G>, names: BTreeMap<String, String>) -> Self {
        Self {
            gateway,
            known: BTreeMap::new(),
            unusable: Vec::new(),
            names,
        }
    }

    /// Query the gateway and diff against the known set.
    ///
    /// Every gateway failure is reported as [`Error::DiscoveryUnavailable`]
    /// and leaves the known set unchanged.
    pub async fn refresh(&mut self) -> Result<DeviceDiff> {
        let list = self.gateway.list_devices().await.map_err(|e| match e {
            Error::DiscoveryUnavailable { .. } => e,
            other => Error::discovery_unavailable(other.to_string()),
        })?;

        let mut current: BTreeMap<String, DeviceContext> = BTreeMap::new();
        for device in list.devices {
            let serial = device.serial.clone();
            let ctx = match self.known.get(&serial) {
                Some(existing) => existing.clone(),
                None => self.context_for(DeviceContext::new(device)),
            };
            current.insert(serial, ctx);
        }

        let added: Vec<DeviceContext> = current
            .iter()
            .filter(|(serial, _)| !self.known.contains_key(*serial))
            .map(|(_, ctx)| ctx.clone())
            .collect();
        let removed: Vec<DeviceContext> = self
            .known
            .iter()
            .filter(|(serial, _)| !current.contains_key(*serial))
            .map(|(_, ctx)| ctx.clone())
            .collect();

        for ctx in &added {
            info!("Device connected: {}", ctx.display_name());
        }
        for ctx in &removed {
            info!("Device disconnected: {}", ctx.display_name());
        }

        self.known = current;
        self.unusable = list.unusable;

        Ok(DeviceDiff { added, removed })
    }

    fn context_for(&self, ctx: DeviceContext) -> DeviceContext {
        match self.names.get(ctx.serial()) {
            Some(name) => ctx.with_display_name(name.clone()),
            None => ctx,
        }
    }

    /// Copy of the known usable devices, ordered by serial
    pub fn snapshot(&self) -> Vec<DeviceContext> {
        self.known.values().cloned().collect()
    }

    /// Devices reported in a non-usable state on the last refresh
    pub fn unusable(&self) -> &[UnusableDevice] {
        &self.unusable
    }

    pub fn get(&self, serial: &str) -> Option<&DeviceContext> {
        self.known.get(serial)
    }

    /// Set or clear the display name for `serial`.
    ///
    /// The name is remembered even when the device is not currently
    /// connected; the updated context is returned when it is.
    pub fn rename(&mut self, serial: &str, name: Option<String>) -> Option<DeviceContext> {
        let cleaned = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        match &cleaned {
            Some(n) => {
                self.names.insert(serial.to_string(), n.clone());
            }
            None => {
                self.names.remove(serial);
            }
        }

        let ctx = self.known.get_mut(serial)?;
        ctx.set_display_name(cleaned);
        Some(ctx.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_bridge::test_utils::FakeGateway;
    use deck_core::ConnectionState;

    fn registry(gateway: &FakeGateway) -> DeviceRegistry<FakeGateway> {
        DeviceRegistry::new(Arc::new(gateway.clone()))
    }

    #[tokio::test]
    async fn test_refresh_reports_added_then_nothing() {
        let gateway = FakeGateway::new();
        gateway.set_devices(&["abc123", "def456"]);
        let mut registry = registry(&gateway);

        let diff = registry.refresh().await.unwrap();
        assert_eq!(diff.added.len(), 2);
        assert!(diff.removed.is_empty());

        let again = registry.refresh().await.unwrap();
        assert!(again.is_empty());
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_reports_removed() {
        let gateway = FakeGateway::new();
        gateway.set_devices(&["abc123", "def456"]);
        let mut registry = registry(&gateway);
        registry.refresh().await.unwrap();

        gateway.set_devices(&["def456"]);
        let diff = registry.refresh().await.unwrap();

        assert!(diff.added.is_empty());
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].serial(), "abc123");
        assert!(registry.get("abc123").is_none());
    }

    #[tokio::test]
    async fn test_failure_keeps_known_set() {
        let gateway = FakeGateway::new();
        gateway.set_devices(&["abc123"]);
        let mut registry = registry(&gateway);
        registry.refresh().await.unwrap();

        gateway.fail_discovery("adb timed out");
        let err = registry.refresh().await.unwrap_err();

        assert!(matches!(err, Error::DiscoveryUnavailable { .. }));
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_unusable_devices_are_listed_not_added() {
        let gateway = FakeGateway::new();
        gateway.set_devices(&["abc123"]);
        gateway.set_unusable("xyz789", ConnectionState::Unauthorized);
        let mut registry = registry(&gateway);

        let diff = registry.refresh().await.unwrap();

        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].serial(), "abc123");
        assert_eq!(registry.unusable().len(), 1);
        assert_eq!(registry.unusable()[0].device.serial, "xyz789");
    }

    #[tokio::test]
    async fn test_names_seeded_and_renamed() {
        let gateway = FakeGateway::new();
        gateway.set_devices(&["abc123"]);
        let names = BTreeMap::from([("abc123".to_string(), "Work phone".to_string())]);
        let mut registry = DeviceRegistry::with_names(Arc::new(gateway.clone()), names);

        let diff = registry.refresh().await.unwrap();
        assert_eq!(diff.added[0].display_name(), "Work phone");

        let renamed = registry.rename("abc123", Some("  Test rig ".to_string()));
        assert_eq!(renamed.unwrap().display_name(), "Test rig");

        // Reconnect keeps the new name
        gateway.set_devices(&[]);
        registry.refresh().await.unwrap();
        gateway.set_devices(&["abc123"]);
        let diff = registry.refresh().await.unwrap();
        assert_eq!(diff.added[0].display_name(), "Test rig");

        assert_eq!(
            registry.rename("abc123", None).unwrap().display_name(),
            "abc123"
        );
    }

    #[tokio::test]
    async fn test_rename_unknown_device_is_remembered() {
        let gateway = FakeGateway::new();
        let mut registry = registry(&gateway);

        assert!(registry.rename("later", Some("Tablet".to_string())).is_none());

        gateway.set_devices(&["later"]);
        let diff = registry.refresh().await.unwrap();
        assert_eq!(diff.added[0].display_name(), "Tablet");
    }
}
