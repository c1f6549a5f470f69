//! The dispatch surface — the only interface the UI/agent layers see.
//!
//! `dispatch(device_id, action)` always returns a structured
//! [`ActionResult`]; no raw error ever crosses this boundary.
//! Execution is single-flight per device: a second action for the
//! same device waits on the first, while different devices proceed in
//! parallel on their own transports.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::action::{ActionResult, DeviceAction};
use crate::device::DeviceCapabilities;
use crate::error::{ActionErrorCode, DroverError};
use crate::registry::{DeviceRegistry, DeviceStatus};

/// Routes actions to registered drivers.
pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Execute `action` on the device registered under `device_id`.
    pub async fn dispatch(&self, device_id: &str, action: DeviceAction) -> ActionResult {
        let Some((driver, flight)) = self.registry.lookup(device_id).await else {
            return DroverError::DeviceNotFound(device_id.to_string()).into();
        };

        // one in-flight command per device
        let _guard = flight.lock().await;
        debug!(device_id, action = %action.action_type(), "dispatch");
        let result = driver.execute(action).await;

        match &result {
            ActionResult::Success { .. } => {
                self.registry.mark_seen(device_id).await;
            }
            ActionResult::Failure { code, error }
                if matches!(code, ActionErrorCode::Timeout | ActionErrorCode::Unknown) =>
            {
                // a silently-dead device is discovered here, on its
                // next attempted execute
                warn!(device_id, %code, %error, "action failed; marking device errored");
                self.registry
                    .update_status(device_id, DeviceStatus::Error, Some(error.clone()))
                    .await;
            }
            ActionResult::Failure { code, error } => {
                debug!(device_id, %code, %error, "action failed");
            }
        }
        result
    }

    /// Best-effort capability snapshot. Safe to call at any time;
    /// `None` only when no such device is registered.
    pub async fn capabilities(&self, device_id: &str) -> Option<DeviceCapabilities> {
        let (driver, _) = self.registry.lookup(device_id).await?;
        Some(driver.capabilities().await)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionData;
    use crate::device::DevicePlatform;
    use crate::driver::DeviceDriver;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Driver whose results are scripted per call.
    struct ScriptedDriver {
        results: Vec<ActionResult>,
        calls: AtomicU32,
    }

    impl ScriptedDriver {
        fn new(results: Vec<ActionResult>) -> Self {
            Self {
                results,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl DeviceDriver for ScriptedDriver {
        async fn execute(&self, _action: DeviceAction) -> ActionResult {
            let i = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.results[i.min(self.results.len() - 1)].clone()
        }
        async fn capabilities(&self) -> DeviceCapabilities {
            DeviceCapabilities::new(DevicePlatform::Web, "scripted", "Scripted")
        }
    }

    fn tap() -> DeviceAction {
        DeviceAction::Tap { x: 1, y: 2 }
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let dispatcher = Dispatcher::new(Arc::new(DeviceRegistry::new()));
        match dispatcher.dispatch("ghost", tap()).await {
            ActionResult::Failure { code, error } => {
                assert_eq!(code, ActionErrorCode::NotFound);
                assert!(error.contains("ghost"));
            }
            _ => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn success_flows_back_unchanged() {
        let registry = Arc::new(DeviceRegistry::new());
        let expected = ActionResult::ok_with(ActionData::Text {
            text: "hi".to_string(),
        });
        registry
            .register(
                "d1",
                "alice",
                Arc::new(ScriptedDriver::new(vec![expected.clone()])),
                None,
            )
            .await;

        let result = Dispatcher::new(registry).dispatch("d1", tap()).await;
        assert_eq!(result, expected);
    }

    #[tokio::test]
    async fn unknown_failure_marks_device_errored() {
        let registry = Arc::new(DeviceRegistry::new());
        registry
            .register(
                "d1",
                "alice",
                Arc::new(ScriptedDriver::new(vec![ActionResult::fail(
                    ActionErrorCode::Unknown,
                    "backend exploded",
                )])),
                None,
            )
            .await;

        let dispatcher = Dispatcher::new(registry.clone());
        dispatcher.dispatch("d1", tap()).await;

        let conn = registry.get_device("d1").await.unwrap();
        assert_eq!(conn.status, DeviceStatus::Error);
        assert_eq!(conn.error.as_deref(), Some("backend exploded"));
    }

    #[tokio::test]
    async fn timeout_failure_marks_device_errored() {
        let registry = Arc::new(DeviceRegistry::new());
        registry
            .register(
                "d1",
                "alice",
                Arc::new(ScriptedDriver::new(vec![ActionResult::fail(
                    ActionErrorCode::Timeout,
                    "no CLSE within deadline",
                )])),
                None,
            )
            .await;

        Dispatcher::new(registry.clone()).dispatch("d1", tap()).await;
        assert!(!registry.is_connected("d1").await);
    }

    #[tokio::test]
    async fn not_supported_failure_keeps_device_connected() {
        let registry = Arc::new(DeviceRegistry::new());
        registry
            .register(
                "d1",
                "alice",
                Arc::new(ScriptedDriver::new(vec![ActionResult::fail(
                    ActionErrorCode::NotSupported,
                    "no ui tree here",
                )])),
                None,
            )
            .await;

        Dispatcher::new(registry.clone()).dispatch("d1", tap()).await;
        assert!(registry.is_connected("d1").await);
    }

    #[tokio::test]
    async fn capability_snapshot_endpoint() {
        let registry = Arc::new(DeviceRegistry::new());
        registry
            .register(
                "d1",
                "alice",
                Arc::new(ScriptedDriver::new(vec![ActionResult::ok()])),
                None,
            )
            .await;

        let dispatcher = Dispatcher::new(registry);
        let caps = dispatcher.capabilities("d1").await.unwrap();
        assert!(!caps.supported_actions.is_empty());
        assert!(dispatcher.capabilities("ghost").await.is_none());
    }
}
