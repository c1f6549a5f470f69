//! The device registry: one live connection entry per logical device.
//!
//! The registry is an explicitly constructed value shared by `Arc` —
//! there is no global instance. Connection state is owned exclusively
//! here and mutated only through registry operations; drivers never
//! reach into it. All operations take the inner lock, so a lookup
//! racing an unregister observes either the pre- or post-unregister
//! state, never a torn read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::device::DeviceCapabilities;
use crate::driver::DeviceDriver;

// ── DeviceStatus ─────────────────────────────────────────────────

/// Connection status of a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Connected,
    Connecting,
    Disconnected,
    Error,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ── DeviceConnection ─────────────────────────────────────────────

/// Registry-owned record of one device connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConnection {
    pub device_id: String,
    pub user_id: String,
    pub status: DeviceStatus,
    pub capabilities: Option<DeviceCapabilities>,
    pub last_seen_at: SystemTime,
    pub connected_at: Option<SystemTime>,
    pub error: Option<String>,
}

struct DeviceEntry {
    driver: Arc<dyn DeviceDriver>,
    connection: DeviceConnection,
    /// Serializes action execution for this device. The wire protocol
    /// and the stream id pairing carry one command at a time.
    flight: Arc<Mutex<()>>,
}

// ── DeviceRegistry ───────────────────────────────────────────────

/// Tracks drivers and connection state, scoped by owning user.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, DeviceEntry>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under `device_id`, replacing any prior entry
    /// for the same id. The new entry starts `connected`.
    pub async fn register(
        &self,
        device_id: impl Into<String>,
        user_id: impl Into<String>,
        driver: Arc<dyn DeviceDriver>,
        capabilities: Option<DeviceCapabilities>,
    ) -> DeviceConnection {
        let device_id = device_id.into();
        let now = SystemTime::now();
        let connection = DeviceConnection {
            device_id: device_id.clone(),
            user_id: user_id.into(),
            status: DeviceStatus::Connected,
            capabilities,
            last_seen_at: now,
            connected_at: Some(now),
            error: None,
        };

        let entry = DeviceEntry {
            driver,
            connection: connection.clone(),
            flight: Arc::new(Mutex::new(())),
        };

        let replaced = self
            .devices
            .write()
            .await
            .insert(device_id.clone(), entry)
            .is_some();
        debug!(%device_id, replaced, "device registered");
        connection
    }

    /// Remove a device, asking its driver to release resources first.
    ///
    /// Returns whether a device was actually found and removed.
    pub async fn unregister(&self, device_id: &str) -> bool {
        let mut devices = self.devices.write().await;
        let Some(entry) = devices.get(device_id) else {
            return false;
        };
        if let Err(e) = entry.driver.disconnect().await {
            warn!(device_id, error = %e, "driver disconnect failed during unregister");
        }
        devices.remove(device_id);
        debug!(device_id, "device unregistered");
        true
    }

    /// Look up a connection snapshot, touching `last_seen_at` —
    /// polling a device counts as liveness evidence.
    pub async fn get_device(&self, device_id: &str) -> Option<DeviceConnection> {
        let mut devices = self.devices.write().await;
        let entry = devices.get_mut(device_id)?;
        touch(&mut entry.connection);
        Some(entry.connection.clone())
    }

    /// Set a device's status, replacing or clearing its error message.
    pub async fn update_status(
        &self,
        device_id: &str,
        status: DeviceStatus,
        error: Option<String>,
    ) -> bool {
        let mut devices = self.devices.write().await;
        let Some(entry) = devices.get_mut(device_id) else {
            return false;
        };
        entry.connection.status = status;
        entry.connection.error = error;
        true
    }

    /// Snapshots of every device owned by `user_id`. No side effects.
    pub async fn devices_for_user(&self, user_id: &str) -> Vec<DeviceConnection> {
        self.devices
            .read()
            .await
            .values()
            .filter(|e| e.connection.user_id == user_id)
            .map(|e| e.connection.clone())
            .collect()
    }

    /// Snapshots of every registered device. No side effects.
    pub async fn all_devices(&self) -> Vec<DeviceConnection> {
        self.devices
            .read()
            .await
            .values()
            .map(|e| e.connection.clone())
            .collect()
    }

    /// Whether the device exists and is currently `connected`.
    pub async fn is_connected(&self, device_id: &str) -> bool {
        self.devices
            .read()
            .await
            .get(device_id)
            .is_some_and(|e| e.connection.status == DeviceStatus::Connected)
    }

    /// Unregister everything, disconnecting each driver.
    pub async fn close(&self) {
        let entries: Vec<DeviceEntry> = {
            let mut devices = self.devices.write().await;
            devices.drain().map(|(_, e)| e).collect()
        };
        for entry in &entries {
            if let Err(e) = entry.driver.disconnect().await {
                warn!(device_id = %entry.connection.device_id, error = %e, "driver disconnect failed during close");
            }
        }
        debug!(count = entries.len(), "registry closed");
    }

    /// Driver handle and flight lock for dispatch. Touches
    /// `last_seen_at` like any successful lookup.
    pub(crate) async fn lookup(
        &self,
        device_id: &str,
    ) -> Option<(Arc<dyn DeviceDriver>, Arc<Mutex<()>>)> {
        let mut devices = self.devices.write().await;
        let entry = devices.get_mut(device_id)?;
        touch(&mut entry.connection);
        Some((entry.driver.clone(), entry.flight.clone()))
    }

    /// Record activity on a device.
    pub(crate) async fn mark_seen(&self, device_id: &str) {
        if let Some(entry) = self.devices.write().await.get_mut(device_id) {
            touch(&mut entry.connection);
        }
    }
}

/// `last_seen_at` is monotonically non-decreasing even if the wall
/// clock steps backwards.
fn touch(connection: &mut DeviceConnection) {
    connection.last_seen_at = connection.last_seen_at.max(SystemTime::now());
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionResult, DeviceAction};
    use crate::device::DevicePlatform;
    use crate::driver::DeviceDriver;
    use crate::error::DroverError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct StubDriver {
        disconnected: AtomicBool,
    }

    #[async_trait]
    impl DeviceDriver for StubDriver {
        async fn execute(&self, _action: DeviceAction) -> ActionResult {
            ActionResult::ok()
        }
        async fn capabilities(&self) -> DeviceCapabilities {
            DeviceCapabilities::new(DevicePlatform::Desktop, "stub", "Stub")
        }
        async fn disconnect(&self) -> Result<(), DroverError> {
            self.disconnected.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn register_then_get_is_connected() {
        let registry = DeviceRegistry::new();
        registry
            .register("d1", "alice", Arc::new(StubDriver::default()), None)
            .await;

        let conn = registry.get_device("d1").await.unwrap();
        assert_eq!(conn.status, DeviceStatus::Connected);
        assert_eq!(conn.user_id, "alice");
        assert!(conn.connected_at.is_some());
        assert!(conn.error.is_none());
    }

    #[tokio::test]
    async fn last_seen_is_monotonic() {
        let registry = DeviceRegistry::new();
        registry
            .register("d1", "alice", Arc::new(StubDriver::default()), None)
            .await;

        let first = registry.get_device("d1").await.unwrap().last_seen_at;
        let second = registry.get_device("d1").await.unwrap().last_seen_at;
        assert!(second >= first);
    }

    #[tokio::test]
    async fn unregister_unknown_is_false() {
        let registry = DeviceRegistry::new();
        assert!(!registry.unregister("ghost").await);
    }

    #[tokio::test]
    async fn unregister_disconnects_driver() {
        let registry = DeviceRegistry::new();
        let driver = Arc::new(StubDriver::default());
        registry
            .register("d1", "alice", driver.clone(), None)
            .await;

        assert!(registry.unregister("d1").await);
        assert!(driver.disconnected.load(Ordering::SeqCst));
        assert!(registry.get_device("d1").await.is_none());
    }

    #[tokio::test]
    async fn register_overwrites_prior_entry() {
        let registry = DeviceRegistry::new();
        registry
            .register("d1", "alice", Arc::new(StubDriver::default()), None)
            .await;
        registry
            .register("d1", "bob", Arc::new(StubDriver::default()), None)
            .await;

        let conn = registry.get_device("d1").await.unwrap();
        assert_eq!(conn.user_id, "bob");
        assert_eq!(registry.all_devices().await.len(), 1);
    }

    #[tokio::test]
    async fn update_status_sets_and_clears_error() {
        let registry = DeviceRegistry::new();
        registry
            .register("d1", "alice", Arc::new(StubDriver::default()), None)
            .await;

        assert!(
            registry
                .update_status("d1", DeviceStatus::Error, Some("usb gone".into()))
                .await
        );
        let conn = registry.get_device("d1").await.unwrap();
        assert_eq!(conn.status, DeviceStatus::Error);
        assert_eq!(conn.error.as_deref(), Some("usb gone"));
        assert!(!registry.is_connected("d1").await);

        assert!(
            registry
                .update_status("d1", DeviceStatus::Connected, None)
                .await
        );
        let conn = registry.get_device("d1").await.unwrap();
        assert_eq!(conn.status, DeviceStatus::Connected);
        assert!(conn.error.is_none());
        assert!(registry.is_connected("d1").await);

        assert!(
            !registry
                .update_status("ghost", DeviceStatus::Error, None)
                .await
        );
    }

    #[tokio::test]
    async fn user_scoping() {
        let registry = DeviceRegistry::new();
        registry
            .register("d1", "alice", Arc::new(StubDriver::default()), None)
            .await;
        registry
            .register("d2", "alice", Arc::new(StubDriver::default()), None)
            .await;
        registry
            .register("d3", "bob", Arc::new(StubDriver::default()), None)
            .await;

        let alice = registry.devices_for_user("alice").await;
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|c| c.user_id == "alice"));
        assert_eq!(registry.devices_for_user("carol").await.len(), 0);
        assert_eq!(registry.all_devices().await.len(), 3);
    }

    #[tokio::test]
    async fn close_disconnects_everything() {
        let registry = DeviceRegistry::new();
        let a = Arc::new(StubDriver::default());
        let b = Arc::new(StubDriver::default());
        registry.register("d1", "alice", a.clone(), None).await;
        registry.register("d2", "bob", b.clone(), None).await;

        registry.close().await;

        assert!(a.disconnected.load(Ordering::SeqCst));
        assert!(b.disconnected.load(Ordering::SeqCst));
        assert!(registry.all_devices().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_register_and_lookup() {
        let registry = Arc::new(DeviceRegistry::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("d{}", i % 4);
                registry
                    .register(&id, "alice", Arc::new(StubDriver::default()), None)
                    .await;
                let _ = registry.get_device(&id).await;
                registry.unregister(&id).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        // no torn state: every surviving entry is fully formed
        for conn in registry.all_devices().await {
            assert!(!conn.device_id.is_empty());
        }
    }
}
