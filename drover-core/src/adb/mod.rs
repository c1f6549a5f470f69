//! Android debug-bridge wire protocol, spoken directly over raw USB.
//!
//! This is a from-scratch client-side implementation — no host `adb`
//! server, no daemon. Three layers:
//!
//! - [`message`] — pure framing: a 24-byte little-endian header plus
//!   payload, with an additive checksum and a complement-of-command
//!   magic word.
//! - [`transport`] — endpoint discovery and bulk I/O over a claimed
//!   USB interface.
//! - [`engine`] — the connection handshake and per-command stream
//!   state machine, exposing shell execution and screen capture.

pub mod engine;
pub mod message;
pub mod transport;

pub use engine::{EnginePhase, ProtocolEngine, Stream, StreamState};
pub use message::{Command, Header, Message, CONNECT_BANNER, HEADER_LEN, MAX_PAYLOAD, PROTOCOL_VERSION};
pub use transport::{
    list_devices, select_endpoints, DeviceInfo, DeviceLayout, DeviceSummary, EndpointDirection,
    EndpointLayout, EndpointPair, InterfaceLayout, Transport, UsbTransport, KNOWN_VENDOR_IDS,
};
