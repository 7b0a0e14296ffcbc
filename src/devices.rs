use crate::errors::{DaemonError, Result};
use rusb::{Context, UsbContext};
use serde::Serialize;
use tracing::{debug, error};

/// Known thermal printer vendor IDs
const VENDOR_IDS: &[(u16, &str)] = &[
    (0x04b8, "Epson"),
    (0x0519, "Star Micronics"),
    (0x04f9, "Brother"),
    (0x1d90, "Citizen"),
    (0x0fe6, "ICS Advent"),
    (0x154f, "Wincor Nixdorf"),
];

/// One attached USB device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsbDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Set when the vendor is a known receipt printer maker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
}

impl UsbDevice {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            vendor: known_vendor(vendor_id).map(str::to_string),
        }
    }
}

pub fn known_vendor(vendor_id: u16) -> Option<&'static str> {
    VENDOR_IDS
        .iter()
        .find(|(vid, _)| *vid == vendor_id)
        .map(|(_, name)| *name)
}

/// Every device on every bus, read-only
pub fn list_usb_devices() -> Result<Vec<UsbDevice>> {
    let context = Context::new().map_err(|e| {
        error!("Failed to initialize USB context: {}", e);
        DaemonError::Usb(e)
    })?;

    let mut devices = Vec::new();
    for device in context.devices()?.iter() {
        let descriptor = device.device_descriptor()?;
        devices.push(UsbDevice::new(descriptor.vendor_id(), descriptor.product_id()));
    }

    debug!("Found {} USB devices", devices.len());
    Ok(devices)
}
