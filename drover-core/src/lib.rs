//! # drover-core
//!
//! Uniform input/capture actions against heterogeneous devices: a
//! desktop OS, an Android device reached directly over USB, and a
//! controlled browser session.
//!
//! This crate contains:
//! - **Actions**: `DeviceAction`, `ActionResult`, `ActionErrorCode` —
//!   the one contract every backend speaks
//! - **Drivers**: `DeviceDriver` and its Desktop / Android / Web
//!   implementations
//! - **Wire protocol**: `Message` framing, the `UsbTransport` bulk
//!   adapter, and the `ProtocolEngine` handshake/stream state machine
//! - **Registry**: `DeviceRegistry` tracking live connections per user
//! - **Dispatch**: `Dispatcher` — the surface consumed by UI/agent
//!   layers
//! - **Error**: `DroverError` — typed, `thiserror`-based error
//!   hierarchy

pub mod action;
pub mod adb;
pub mod device;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod registry;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use action::{ActionData, ActionResult, ActionType, DeviceAction, Modifiers, Point};
pub use adb::{
    Command, DeviceLayout, EndpointPair, EnginePhase, Message, ProtocolEngine, Transport,
    UsbTransport,
};
pub use device::{DeviceCapabilities, DevicePlatform, ScreenSize};
pub use dispatch::Dispatcher;
pub use driver::{
    AndroidDriver, BrowserSession, DesktopDriver, DeviceDriver, InputBackend, NativeInput,
    WebDriver,
};
pub use error::{ActionErrorCode, DroverError};
pub use registry::{DeviceConnection, DeviceRegistry, DeviceStatus};
