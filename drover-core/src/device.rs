//! Device identity and capability snapshots.
//!
//! A [`DeviceCapabilities`] value is an immutable snapshot recomputed on
//! every query. Capability queries are safe to poll: when a backend is
//! unreachable the driver answers with conservative defaults instead of
//! failing.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::action::ActionType;

// ── DevicePlatform ───────────────────────────────────────────────

/// The kind of backend a driver talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePlatform {
    Desktop,
    Android,
    Web,
}

impl std::fmt::Display for DevicePlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Desktop => write!(f, "desktop"),
            Self::Android => write!(f, "android"),
            Self::Web => write!(f, "web"),
        }
    }
}

// ── ScreenSize ───────────────────────────────────────────────────

/// Screen dimensions in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

// ── DeviceCapabilities ───────────────────────────────────────────

/// What a device can do, declared before dispatch.
///
/// Optional driver surfaces (`get_ui_tree`, text entry) are advertised
/// here as flags and consulted by callers up front — drivers are never
/// feature-probed at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub platform: DevicePlatform,
    pub device_id: String,
    pub device_name: String,
    pub screen_size: ScreenSize,
    pub supported_actions: BTreeSet<ActionType>,
    pub has_keyboard: bool,
    pub has_ui_tree: bool,
}

impl DeviceCapabilities {
    /// Snapshot with every action supported and a placeholder screen size.
    ///
    /// Drivers start from this and subtract what their backend lacks.
    pub fn new(
        platform: DevicePlatform,
        device_id: impl Into<String>,
        device_name: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            device_id: device_id.into(),
            device_name: device_name.into(),
            screen_size: ScreenSize::new(0, 0),
            supported_actions: ActionType::ALL.into_iter().collect(),
            has_keyboard: true,
            has_ui_tree: true,
        }
    }

    /// Set the screen dimensions.
    pub fn with_screen_size(mut self, size: ScreenSize) -> Self {
        self.screen_size = size;
        self
    }

    /// Remove an action from the supported set.
    pub fn without_action(mut self, action: ActionType) -> Self {
        self.supported_actions.remove(&action);
        if action == ActionType::GetUiTree {
            self.has_ui_tree = false;
        }
        self
    }

    /// Mark text entry unavailable.
    pub fn without_keyboard(mut self) -> Self {
        self.has_keyboard = false;
        self.supported_actions.remove(&ActionType::Type);
        self.supported_actions.remove(&ActionType::Key);
        self
    }

    /// Returns `true` when the device declares support for `action`.
    pub fn supports(&self, action: ActionType) -> bool {
        self.supported_actions.contains(&action)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_supports_everything() {
        let caps = DeviceCapabilities::new(DevicePlatform::Android, "usb:1-2", "Pixel 6");
        assert_eq!(caps.supported_actions.len(), ActionType::ALL.len());
        assert!(caps.supports(ActionType::Tap));
        assert!(caps.has_ui_tree);
    }

    #[test]
    fn without_action_clears_flag() {
        let caps = DeviceCapabilities::new(DevicePlatform::Desktop, "local", "Desktop")
            .without_action(ActionType::GetUiTree);
        assert!(!caps.supports(ActionType::GetUiTree));
        assert!(!caps.has_ui_tree);
        assert!(caps.supports(ActionType::Tap));
    }

    #[test]
    fn without_keyboard_removes_text_actions() {
        let caps =
            DeviceCapabilities::new(DevicePlatform::Web, "tab-1", "Browser").without_keyboard();
        assert!(!caps.has_keyboard);
        assert!(!caps.supports(ActionType::Type));
        assert!(!caps.supports(ActionType::Key));
    }

    #[test]
    fn platform_serializes_snake_case() {
        let json = serde_json::to_string(&DevicePlatform::Android).unwrap();
        assert_eq!(json, "\"android\"");
    }
}
