pub mod codec;
pub mod commands;
pub mod io;
pub mod lifecycle;
pub mod permission;
pub mod probe;
pub mod session;
pub mod transport;

use std::sync::Arc;

use permission::PermissionNegotiator;
use transport::usb::SystemTransportFactory;
use transport::TransportFactory;

pub use io::{ReadEvent, ReadListener};
pub use lifecycle::{LifecycleCoordinator, LifecycleEvent};
pub use permission::{AutoGrantAuthority, PermissionOutcome, UsbAuthority};
pub use probe::{DeviceDescriptor, DeviceSelector, DriverFamily};
pub use session::{ConnectionParameters, Result, SerialError, SerialSession, SessionState};

/// Top-level wiring: one session, its permission negotiator, and the
/// lifecycle coordinator the host drives.
pub struct SerialCore {
    session: Arc<SerialSession>,
    negotiator: PermissionNegotiator,
}

impl SerialCore {
    pub fn new(factory: Arc<dyn TransportFactory>, authority: Arc<dyn UsbAuthority>) -> Self {
        let session = Arc::new(SerialSession::new(factory.clone()));
        Self {
            session,
            negotiator: PermissionNegotiator::new(factory, authority),
        }
    }

    /// Core backed by the operating system's serial enumerator. Desktop
    /// platforms have no per-device USB prompt, so requests grant
    /// immediately.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemTransportFactory), Arc::new(AutoGrantAuthority))
    }

    pub fn session(&self) -> &Arc<SerialSession> {
        &self.session
    }

    pub fn lifecycle(&self) -> LifecycleCoordinator {
        LifecycleCoordinator::new(self.session.clone())
    }

    /// Select the first probed device and run the authorization handshake.
    /// The selection is kept even when permission is denied; a later open
    /// simply fails at the platform level.
    pub async fn request_permission(
        &self,
        selector: Option<DeviceSelector>,
    ) -> Result<PermissionOutcome> {
        let device = self.negotiator.select_device(selector.as_ref())?;
        self.session.select_device(device.clone()).await;
        self.negotiator.authorize(&device).await
    }
}
