//! USB transport: endpoint discovery, interface claiming, bulk I/O.
//!
//! The debug service on a device is a vendor-specific interface with a
//! well-known class triple. Selection is a pure function over a
//! descriptor snapshot ([`DeviceLayout`]) so it can be exercised
//! without hardware; the live path extracts that snapshot from the
//! active configuration via `nusb`.

use async_trait::async_trait;
use nusb::transfer::{Direction, EndpointType, RequestBuffer};
use nusb::Device;

use crate::error::DroverError;

pub use nusb::DeviceInfo;

// ── Interface signature ──────────────────────────────────────────

/// Vendor-specific class of the debug interface.
pub const ADB_INTERFACE_CLASS: u8 = 0xFF;
/// Subclass of the debug interface.
pub const ADB_INTERFACE_SUBCLASS: u8 = 0x42;
/// Protocol of the debug interface.
pub const ADB_INTERFACE_PROTOCOL: u8 = 0x01;

/// Vendor ids of mobile chipsets / OEMs offered for pairing.
///
/// Devices outside this allowlist are not surfaced for selection.
pub const KNOWN_VENDOR_IDS: &[u16] = &[
    0x18D1, // Google
    0x04E8, // Samsung
    0x22B8, // Motorola
    0x0BB4, // HTC
    0x12D1, // Huawei
    0x1004, // LG
    0x0FCE, // Sony
    0x2717, // Xiaomi
    0x2A70, // OnePlus
    0x22D9, // Oppo
    0x0B05, // Asus
    0x17EF, // Lenovo
    0x19D2, // ZTE
    0x05C6, // Qualcomm
    0x0E8D, // MediaTek
];

// ── Descriptor snapshot ──────────────────────────────────────────

/// Transfer direction of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDirection {
    In,
    Out,
}

/// One endpoint of an interface.
#[derive(Debug, Clone, Copy)]
pub struct EndpointLayout {
    /// Endpoint address including the direction bit.
    pub address: u8,
    pub direction: EndpointDirection,
    pub bulk: bool,
}

/// One interface (alternate setting) of the active configuration.
#[derive(Debug, Clone)]
pub struct InterfaceLayout {
    pub number: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub endpoints: Vec<EndpointLayout>,
}

/// Descriptor snapshot of a device's active configuration.
#[derive(Debug, Clone, Default)]
pub struct DeviceLayout {
    pub interfaces: Vec<InterfaceLayout>,
}

impl DeviceLayout {
    /// Snapshot the active configuration of an open device.
    pub fn from_device(device: &Device) -> Result<Self, DroverError> {
        let config = device
            .active_configuration()
            .map_err(|e| DroverError::Transport(format!("read active configuration: {e}")))?;

        let mut interfaces = Vec::new();
        for group in config.interfaces() {
            for alt in group.alt_settings() {
                interfaces.push(InterfaceLayout {
                    number: alt.interface_number(),
                    class: alt.class(),
                    subclass: alt.subclass(),
                    protocol: alt.protocol(),
                    endpoints: alt
                        .endpoints()
                        .map(|ep| EndpointLayout {
                            address: ep.address(),
                            direction: match ep.direction() {
                                Direction::In => EndpointDirection::In,
                                Direction::Out => EndpointDirection::Out,
                            },
                            bulk: ep.transfer_type() == EndpointType::Bulk,
                        })
                        .collect(),
                });
            }
        }
        Ok(Self { interfaces })
    }
}

// ── Endpoint selection ───────────────────────────────────────────

/// A claimed interface's bulk endpoint addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPair {
    pub interface: u8,
    pub ep_in: u8,
    pub ep_out: u8,
}

/// Pick the debug interface's bulk endpoints.
///
/// First interface matching the class/subclass/protocol signature (and
/// actually carrying a bulk IN/OUT pair) wins; otherwise the first
/// interface with any bulk IN/OUT pair is used. `None` means this
/// device does not speak the protocol — a normal outcome for
/// non-matching hardware, not an error.
pub fn select_endpoints(layout: &DeviceLayout) -> Option<EndpointPair> {
    let signature = layout.interfaces.iter().find(|i| {
        i.class == ADB_INTERFACE_CLASS
            && i.subclass == ADB_INTERFACE_SUBCLASS
            && i.protocol == ADB_INTERFACE_PROTOCOL
    });
    if let Some(pair) = signature.and_then(bulk_pair) {
        return Some(pair);
    }
    layout.interfaces.iter().find_map(bulk_pair)
}

fn bulk_pair(iface: &InterfaceLayout) -> Option<EndpointPair> {
    let ep_in = iface
        .endpoints
        .iter()
        .find(|e| e.bulk && e.direction == EndpointDirection::In)?;
    let ep_out = iface
        .endpoints
        .iter()
        .find(|e| e.bulk && e.direction == EndpointDirection::Out)?;
    Some(EndpointPair {
        interface: iface.number,
        ep_in: ep_in.address,
        ep_out: ep_out.address,
    })
}

// ── Transport trait ──────────────────────────────────────────────

/// Raw byte transfer, the seam between the protocol engine and USB.
///
/// Failures here are transport-level (`Transport` / `Transfer`
/// variants) and are kept distinct from protocol-level failures.
#[async_trait]
pub trait Transport: Send {
    /// Write one buffer to the peer.
    async fn send(&mut self, data: &[u8]) -> Result<(), DroverError>;

    /// Read up to `max_len` bytes from the peer.
    async fn recv(&mut self, max_len: usize) -> Result<Vec<u8>, DroverError>;

    /// Release any held resources. Safe to call more than once.
    async fn close(&mut self) -> Result<(), DroverError> {
        Ok(())
    }
}

// ── Device listing ───────────────────────────────────────────────

/// Identity of a pairable device, for selection UIs.
#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: Option<String>,
    pub serial: Option<String>,
    /// Stable-ish bus address, e.g. `usb:1-4`.
    pub bus_id: String,
}

/// Enumerate attached devices whose vendor id is allowlisted.
///
/// `extra_vendor_ids` extends [`KNOWN_VENDOR_IDS`] for hardware the
/// fixed set does not know about.
pub fn list_devices(
    extra_vendor_ids: &[u16],
) -> Result<Vec<(DeviceSummary, DeviceInfo)>, DroverError> {
    let devices = nusb::list_devices()
        .map_err(|e| DroverError::Transport(format!("enumerate usb devices: {e}")))?;

    Ok(devices
        .filter(|info| {
            KNOWN_VENDOR_IDS.contains(&info.vendor_id())
                || extra_vendor_ids.contains(&info.vendor_id())
        })
        .map(|info| {
            let summary = DeviceSummary {
                vendor_id: info.vendor_id(),
                product_id: info.product_id(),
                product: info.product_string().map(str::to_string),
                serial: info.serial_number().map(str::to_string),
                bus_id: format!("usb:{}-{}", info.bus_number(), info.device_address()),
            };
            (summary, info)
        })
        .collect())
}

// ── UsbTransport ─────────────────────────────────────────────────

/// An open, claimed USB link to one device.
pub struct UsbTransport {
    device: Option<Device>,
    interface: Option<nusb::Interface>,
    pair: EndpointPair,
}

impl UsbTransport {
    /// Open the device, pick endpoints, and claim the interface.
    ///
    /// Selects configuration 1 when the device reports none active.
    pub fn open(info: &DeviceInfo) -> Result<Self, DroverError> {
        let device = info
            .open()
            .map_err(|e| DroverError::Transport(format!("open device: {e}")))?;

        if device.active_configuration().is_err() {
            device
                .set_configuration(1)
                .map_err(|e| DroverError::Transport(format!("set configuration 1: {e}")))?;
        }

        let layout = DeviceLayout::from_device(&device)?;
        let pair = select_endpoints(&layout).ok_or(DroverError::NoUsableInterface)?;

        let interface = device
            .claim_interface(pair.interface)
            .map_err(|e| DroverError::Transport(format!("claim interface {}: {e}", pair.interface)))?;

        tracing::debug!(
            interface = pair.interface,
            "usb transport open (in {:#04x}, out {:#04x})",
            pair.ep_in,
            pair.ep_out
        );

        Ok(Self {
            device: Some(device),
            interface: Some(interface),
            pair,
        })
    }

    /// The endpoints this transport is bound to.
    pub fn endpoints(&self) -> EndpointPair {
        self.pair
    }

    fn interface(&self) -> Result<&nusb::Interface, DroverError> {
        self.interface
            .as_ref()
            .ok_or_else(|| DroverError::Transport("transport closed".to_string()))
    }
}

#[async_trait]
impl Transport for UsbTransport {
    async fn send(&mut self, data: &[u8]) -> Result<(), DroverError> {
        let completion = self
            .interface()?
            .bulk_out(self.pair.ep_out, data.to_vec())
            .await;
        completion.status?;
        Ok(())
    }

    async fn recv(&mut self, max_len: usize) -> Result<Vec<u8>, DroverError> {
        let completion = self
            .interface()?
            .bulk_in(self.pair.ep_in, RequestBuffer::new(max_len))
            .await;
        completion.status?;
        Ok(completion.data)
    }

    /// Release the claimed interface, then the handle. Idempotent.
    async fn close(&mut self) -> Result<(), DroverError> {
        drop(self.interface.take());
        drop(self.device.take());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk_ep(address: u8) -> EndpointLayout {
        EndpointLayout {
            address,
            direction: if address & 0x80 != 0 {
                EndpointDirection::In
            } else {
                EndpointDirection::Out
            },
            bulk: true,
        }
    }

    fn interrupt_ep(address: u8) -> EndpointLayout {
        EndpointLayout {
            address,
            direction: if address & 0x80 != 0 {
                EndpointDirection::In
            } else {
                EndpointDirection::Out
            },
            bulk: false,
        }
    }

    fn signature_interface(number: u8) -> InterfaceLayout {
        InterfaceLayout {
            number,
            class: ADB_INTERFACE_CLASS,
            subclass: ADB_INTERFACE_SUBCLASS,
            protocol: ADB_INTERFACE_PROTOCOL,
            endpoints: vec![bulk_ep(0x81), bulk_ep(0x01)],
        }
    }

    #[test]
    fn signature_interface_wins() {
        let layout = DeviceLayout {
            interfaces: vec![
                InterfaceLayout {
                    number: 0,
                    class: 0x08, // mass storage with its own bulk pair
                    subclass: 0x06,
                    protocol: 0x50,
                    endpoints: vec![bulk_ep(0x82), bulk_ep(0x02)],
                },
                signature_interface(1),
            ],
        };
        assert_eq!(
            select_endpoints(&layout),
            Some(EndpointPair {
                interface: 1,
                ep_in: 0x81,
                ep_out: 0x01,
            })
        );
    }

    #[test]
    fn falls_back_to_generic_bulk_pair() {
        let layout = DeviceLayout {
            interfaces: vec![
                InterfaceLayout {
                    number: 0,
                    class: 0x03, // HID, interrupt only
                    subclass: 0,
                    protocol: 0,
                    endpoints: vec![interrupt_ep(0x83)],
                },
                InterfaceLayout {
                    number: 2,
                    class: 0x08,
                    subclass: 0x06,
                    protocol: 0x50,
                    endpoints: vec![bulk_ep(0x82), bulk_ep(0x02)],
                },
            ],
        };
        assert_eq!(
            select_endpoints(&layout),
            Some(EndpointPair {
                interface: 2,
                ep_in: 0x82,
                ep_out: 0x02,
            })
        );
    }

    #[test]
    fn no_usable_interface_is_none() {
        let layout = DeviceLayout {
            interfaces: vec![InterfaceLayout {
                number: 0,
                class: 0x03,
                subclass: 0,
                protocol: 0,
                endpoints: vec![interrupt_ep(0x81), interrupt_ep(0x01)],
            }],
        };
        assert_eq!(select_endpoints(&layout), None);
        assert_eq!(select_endpoints(&DeviceLayout::default()), None);
    }

    #[test]
    fn signature_without_bulk_pair_falls_through() {
        // signature matches but endpoints are unusable; the generic
        // pair on another interface is still found
        let layout = DeviceLayout {
            interfaces: vec![
                InterfaceLayout {
                    endpoints: vec![interrupt_ep(0x81)],
                    ..signature_interface(0)
                },
                InterfaceLayout {
                    number: 1,
                    class: 0x08,
                    subclass: 0x06,
                    protocol: 0x50,
                    endpoints: vec![bulk_ep(0x82), bulk_ep(0x02)],
                },
            ],
        };
        assert_eq!(
            select_endpoints(&layout).map(|p| p.interface),
            Some(1)
        );
    }

    #[test]
    fn allowlist_covers_common_vendors() {
        assert!(KNOWN_VENDOR_IDS.contains(&0x18D1)); // Google
        assert!(KNOWN_VENDOR_IDS.contains(&0x04E8)); // Samsung
        assert!(!KNOWN_VENDOR_IDS.contains(&0x046D)); // a mouse vendor
    }
}
