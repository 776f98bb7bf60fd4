pub mod connection;

pub use connection::SerialSession;

use serde::{Deserialize, Serialize};

use crate::transport::{PortSettings, TransportError};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const READ_TIMEOUT_MS: u64 = 200;
pub const WRITE_TIMEOUT_MS: u64 = 2_000;
pub const READ_BUFFER_SIZE: usize = 4_096;

/// Parity values as they arrive over the host boundary.
pub const PARITY_NONE: u8 = 0;
pub const PARITY_ODD: u8 = 1;
pub const PARITY_EVEN: u8 = 2;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SerialError {
    #[error("no serial driver selected")]
    UnknownDriver,

    #[error("no matching serial device attached")]
    NoDevice,

    #[error("parameter error: {0}")]
    Parameter(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("port is closed")]
    PortClosed,

    #[error("another permission request is pending")]
    PermissionPending,
}

impl SerialError {
    /// Stable code reported across the host boundary.
    pub fn code(&self) -> &'static str {
        match self {
            SerialError::UnknownDriver => "UNKNOWN_DRIVER_ERROR",
            SerialError::NoDevice => "NO_DEVICE_ERROR",
            SerialError::Parameter(_) => "PARAMETER_ERROR",
            SerialError::Connection(_) => "CONNECTION_ERROR",
            SerialError::PortClosed => "PORT_CLOSED_ERROR",
            SerialError::PermissionPending => "PERMISSION_PENDING_ERROR",
        }
    }
}

impl From<TransportError> for SerialError {
    fn from(e: TransportError) -> Self {
        SerialError::Connection(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SerialError>;

/// Negotiated line parameters. Fields omitted by the caller keep the
/// defaults: 115200 8N1, control lines low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionParameters {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: u8,
    pub dtr: bool,
    pub rts: bool,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            stop_bits: 1,
            parity: PARITY_NONE,
            dtr: false,
            rts: false,
        }
    }
}

impl ConnectionParameters {
    /// Validate and translate to port settings. Runs strictly before any
    /// hardware access so a bad value cannot leave a half-open port.
    pub fn port_settings(&self) -> Result<PortSettings> {
        if self.baud_rate == 0 {
            return Err(SerialError::Parameter("baudRate must be non-zero".into()));
        }
        let data_bits = match self.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(SerialError::Parameter(format!("unsupported dataBits: {}", other)));
            }
        };
        let stop_bits = match self.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => {
                return Err(SerialError::Parameter(format!("unsupported stopBits: {}", other)));
            }
        };
        let parity = match self.parity {
            PARITY_NONE => serialport::Parity::None,
            PARITY_ODD => serialport::Parity::Odd,
            PARITY_EVEN => serialport::Parity::Even,
            other => {
                return Err(SerialError::Parameter(format!("unsupported parity: {}", other)));
            }
        };
        Ok(PortSettings {
            baud_rate: self.baud_rate,
            data_bits,
            stop_bits,
            parity,
        })
    }
}

/// Session lifecycle. A port handle exists iff the state is `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Unopened,
    Open,
    Suspended,
    Closed,
}
