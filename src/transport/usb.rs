//! serialport-backed implementation of the port capability.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};

use super::{PortSettings, Result, SerialTransport, TransportError, TransportFactory};
use crate::probe::{AttachedUsbDevice, DeviceDescriptor};
use crate::session::{DEFAULT_BAUD_RATE, READ_TIMEOUT_MS};

pub struct UsbPort {
    port: Box<dyn SerialPort>,
}

impl UsbPort {
    fn apply_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }
}

impl SerialTransport for UsbPort {
    fn set_parameters(&mut self, settings: &PortSettings) -> Result<()> {
        self.port.set_baud_rate(settings.baud_rate)?;
        self.port.set_data_bits(settings.data_bits)?;
        self.port.set_stop_bits(settings.stop_bits)?;
        self.port.set_parity(settings.parity)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.apply_timeout(timeout)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(TransportError::Timeout),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        self.apply_timeout(timeout)?;
        match self.port.write_all(data).and_then(|_| self.port.flush()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(TransportError::Timeout),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.port.write_data_terminal_ready(level)?;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.port.write_request_to_send(level)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // dropping the handle releases the device; nothing else to do
        Ok(())
    }
}

/// Factory over the operating system's serial enumerator.
pub struct SystemTransportFactory;

impl TransportFactory for SystemTransportFactory {
    fn attached_devices(&self) -> Result<Vec<AttachedUsbDevice>> {
        let ports = serialport::available_ports()?;
        let mut devices = Vec::new();
        for port in ports {
            if let SerialPortType::UsbPort(usb_info) = port.port_type {
                devices.push(AttachedUsbDevice {
                    vendor_id: usb_info.vid,
                    product_id: usb_info.pid,
                    port_name: port.port_name.clone(),
                });
            }
        }
        Ok(devices)
    }

    fn open(&self, device: &DeviceDescriptor) -> Result<Box<dyn SerialTransport>> {
        let port = serialport::new(&device.port_name, DEFAULT_BAUD_RATE)
            .timeout(Duration::from_millis(READ_TIMEOUT_MS))
            .open()?;
        log::info!(
            "Opened {} ({:04x}:{:04x}, {:?} family)",
            device.port_name,
            device.vendor_id,
            device.product_id,
            device.family
        );
        Ok(Box::new(UsbPort { port }))
    }
}
