//! Permission negotiation: probe-table discovery plus the asynchronous
//! authorization handshake with the platform.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::probe::{default_probe_table, DeviceDescriptor, DeviceSelector, ProbeTable};
use crate::session::{Result, SerialError};
use crate::transport::TransportFactory;

/// Resolution of a permission prompt.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PermissionOutcome {
    pub granted: bool,
}

/// Platform authorization prompt. The receiver resolves exactly once; the
/// subscription is torn down when it is dropped.
pub trait UsbAuthority: Send + Sync {
    fn request_authorization(&self, device: &DeviceDescriptor) -> oneshot::Receiver<bool>;
}

/// Authority for platforms without a per-device permission broker: every
/// request resolves granted immediately.
pub struct AutoGrantAuthority;

impl UsbAuthority for AutoGrantAuthority {
    fn request_authorization(&self, _device: &DeviceDescriptor) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(true);
        rx
    }
}

pub struct PermissionNegotiator {
    factory: Arc<dyn TransportFactory>,
    authority: Arc<dyn UsbAuthority>,
    pending: AtomicBool,
}

impl PermissionNegotiator {
    pub fn new(factory: Arc<dyn TransportFactory>, authority: Arc<dyn UsbAuthority>) -> Self {
        Self {
            factory,
            authority,
            pending: AtomicBool::new(false),
        }
    }

    /// Enumerate attached devices against the probe table and pick the first
    /// match in enumeration order. Zero candidates is terminal.
    pub fn select_device(&self, selector: Option<&DeviceSelector>) -> Result<DeviceDescriptor> {
        let custom: ProbeTable;
        let table = match selector {
            Some(selector) => {
                custom = selector.probe_table()?;
                &custom
            }
            None => default_probe_table(),
        };
        let attached = self
            .factory
            .attached_devices()
            .map_err(|e| SerialError::Connection(format!("device enumeration failed: {}", e)))?;
        let device = table.find_first(&attached).ok_or(SerialError::NoDevice)?;
        log::info!(
            "Probe matched {:04x}:{:04x} on {} ({:?})",
            device.vendor_id,
            device.product_id,
            device.port_name,
            device.family
        );
        Ok(device)
    }

    /// Await the authorization prompt for `device`. At most one request may
    /// be outstanding; a dropped prompt counts as denial.
    pub async fn authorize(&self, device: &DeviceDescriptor) -> Result<PermissionOutcome> {
        if self.pending.swap(true, Ordering::SeqCst) {
            return Err(SerialError::PermissionPending);
        }
        // the guard clears the flag even when the caller abandons the await
        let _pending = PendingGuard(&self.pending);
        let receiver = self.authority.request_authorization(device);
        let granted = receiver.await.unwrap_or(false);
        Ok(PermissionOutcome { granted })
    }
}

struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
