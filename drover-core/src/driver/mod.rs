//! Backend drivers for the uniform action contract.
//!
//! Every driver implements [`DeviceDriver`]: a required `execute` /
//! `capabilities` core plus provided `connect` / `disconnect` no-ops
//! for backends without persistent handles. Optional surfaces (UI
//! trees, text entry) are declared through capability flags and never
//! feature-probed at runtime.

pub mod android;
pub mod desktop;
pub mod keymap;
pub mod web;

pub use android::AndroidDriver;
pub use desktop::{DesktopDriver, InputBackend, NativeInput, PointerButton};
pub use web::{BrowserSession, WebDriver};

use async_trait::async_trait;

use crate::action::{ActionResult, DeviceAction};
use crate::device::DeviceCapabilities;
use crate::error::DroverError;

/// The polymorphic device contract.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Execute one action.
    ///
    /// Never errors across this boundary: missing capabilities,
    /// backend failures and unsupported action types are all folded
    /// into `ActionResult::Failure`.
    async fn execute(&self, action: DeviceAction) -> ActionResult;

    /// Best-effort capability snapshot.
    ///
    /// Must not fail even when the backend is unreachable; answers
    /// with conservative defaults instead, so polling stays safe.
    async fn capabilities(&self) -> DeviceCapabilities;

    /// Acquire a persistent backend handle, for backends that hold one.
    async fn connect(&self) -> Result<(), DroverError> {
        Ok(())
    }

    /// Release backend resources. The registry calls this before it
    /// removes the device entry.
    async fn disconnect(&self) -> Result<(), DroverError> {
        Ok(())
    }
}
