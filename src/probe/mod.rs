//! Probe table: maps (vendor id, product id) pairs to the driver family
//! whose framing strategy the chip requires.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::session::{Result, SerialError};

/// Supported USB-to-serial chipset families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriverFamily {
    #[default]
    #[serde(rename = "CdcAcmSerialDriver")]
    CdcAcm,
    #[serde(rename = "FtdiSerialDriver")]
    Ftdi,
    #[serde(rename = "Cp21xxSerialDriver")]
    Cp21xx,
    #[serde(rename = "ProlificSerialDriver")]
    Prolific,
    #[serde(rename = "Ch34xSerialDriver")]
    Ch34x,
}

/// A USB device visible to the platform, before any driver match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedUsbDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Platform handle used to open the port later.
    pub port_name: String,
}

/// A device selected for a session. Immutable once selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub family: DriverFamily,
    pub port_name: String,
}

/// Ordered (vendor id, product id) -> driver family lookup.
#[derive(Debug, Clone, Default)]
pub struct ProbeTable {
    entries: Vec<(u16, u16, DriverFamily)>,
}

impl ProbeTable {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn add_product(&mut self, vendor_id: u16, product_id: u16, family: DriverFamily) -> &mut Self {
        self.entries.push((vendor_id, product_id, family));
        self
    }

    pub fn probe(&self, device: &AttachedUsbDevice) -> Option<DriverFamily> {
        self.entries
            .iter()
            .find(|(vid, pid, _)| *vid == device.vendor_id && *pid == device.product_id)
            .map(|(_, _, family)| *family)
    }

    /// First attached device with a table match, in enumeration order.
    pub fn find_first(&self, attached: &[AttachedUsbDevice]) -> Option<DeviceDescriptor> {
        attached.iter().find_map(|device| {
            self.probe(device).map(|family| DeviceDescriptor {
                vendor_id: device.vendor_id,
                product_id: device.product_id,
                family,
                port_name: device.port_name.clone(),
            })
        })
    }
}

/// Built-in table covering the five supported families.
pub fn default_probe_table() -> &'static ProbeTable {
    static TABLE: Lazy<ProbeTable> = Lazy::new(|| {
        let mut table = ProbeTable::new();
        // FTDI
        table.add_product(0x0403, 0x6001, DriverFamily::Ftdi); // FT232R
        table.add_product(0x0403, 0x6010, DriverFamily::Ftdi); // FT2232H
        table.add_product(0x0403, 0x6011, DriverFamily::Ftdi); // FT4232H
        table.add_product(0x0403, 0x6014, DriverFamily::Ftdi); // FT232H
        table.add_product(0x0403, 0x6015, DriverFamily::Ftdi); // FT231X
        // CDC-ACM
        table.add_product(0x2341, 0x0043, DriverFamily::CdcAcm); // Arduino Uno R3
        table.add_product(0x2341, 0x0001, DriverFamily::CdcAcm); // Arduino Uno
        table.add_product(0x2E8A, 0x000A, DriverFamily::CdcAcm); // Raspberry Pi Pico
        table.add_product(0x16C0, 0x0483, DriverFamily::CdcAcm); // Teensy
        table.add_product(0x0483, 0x5740, DriverFamily::CdcAcm); // STM32 VCP
        // CP21xx
        table.add_product(0x10C4, 0xEA60, DriverFamily::Cp21xx); // CP2102
        table.add_product(0x10C4, 0xEA70, DriverFamily::Cp21xx); // CP2105
        table.add_product(0x10C4, 0xEA71, DriverFamily::Cp21xx); // CP2108
        // Prolific
        table.add_product(0x067B, 0x2303, DriverFamily::Prolific); // PL2303
        table.add_product(0x067B, 0x23C3, DriverFamily::Prolific); // PL2303GC
        table.add_product(0x067B, 0x23D3, DriverFamily::Prolific); // PL2303GL
        // CH34x
        table.add_product(0x1A86, 0x7523, DriverFamily::Ch34x); // CH340
        table.add_product(0x1A86, 0x5523, DriverFamily::Ch34x); // CH341
        table
    });
    &TABLE
}

/// A vendor or product id as the host marshals it: an integer, or a string
/// parsed base-16.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UsbId {
    Number(u64),
    Hex(String),
}

impl UsbId {
    pub fn resolve(&self) -> Result<u16> {
        match self {
            UsbId::Number(n) => u16::try_from(*n)
                .map_err(|_| SerialError::Parameter(format!("usb id out of range: {}", n))),
            UsbId::Hex(s) => u16::from_str_radix(s, 16)
                .map_err(|_| SerialError::Parameter(format!("invalid hexadecimal usb id: {:?}", s))),
        }
    }
}

/// Caller-supplied device filter for a permission request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSelector {
    pub vendor_id: UsbId,
    pub product_id: UsbId,
    #[serde(default)]
    pub driver: DriverFamily,
}

impl DeviceSelector {
    /// Single-entry probe table mapping the selected pair to its family.
    pub fn probe_table(&self) -> Result<ProbeTable> {
        let mut table = ProbeTable::new();
        table.add_product(self.vendor_id.resolve()?, self.product_id.resolve()?, self.driver);
        Ok(table)
    }
}
