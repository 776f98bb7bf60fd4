//! Port capability consumed from the platform serial backend: open,
//! parameter application, timed reads and writes, control lines, close.

pub mod usb;

#[cfg(test)]
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::probe::{AttachedUsbDevice, DeviceDescriptor};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The operation hit its deadline. Distinguishable from general I/O
    /// failure: a timed-out read is a normal outcome for callers that poll.
    #[error("transport timeout")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial backend error: {0}")]
    Backend(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Validated line settings applied to an open port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    pub baud_rate: u32,
    pub data_bits: serialport::DataBits,
    pub stop_bits: serialport::StopBits,
    pub parity: serialport::Parity,
}

/// One open port. Implementations are blocking; async callers wrap
/// operations in `spawn_blocking`.
pub trait SerialTransport: Send {
    fn set_parameters(&mut self, settings: &PortSettings) -> Result<()>;

    /// Read into `buf`, waiting up to `timeout`. Reports
    /// `TransportError::Timeout` when the deadline passes with nothing read.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<()>;

    fn set_dtr(&mut self, level: bool) -> Result<()>;

    fn set_rts(&mut self, level: bool) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Platform seam: enumerates attached USB serial devices and opens ports.
pub trait TransportFactory: Send + Sync {
    fn attached_devices(&self) -> Result<Vec<AttachedUsbDevice>>;

    fn open(&self, device: &DeviceDescriptor) -> Result<Box<dyn SerialTransport>>;
}

/// Port handle shared between the request context and the background pump.
pub type SharedPort = Arc<Mutex<Box<dyn SerialTransport>>>;
