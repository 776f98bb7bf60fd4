//! Connection session: owns the selected device, the open port, and the
//! negotiated parameters across suspend/resume cycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::{
    ConnectionParameters, Result, SerialError, SessionState, READ_BUFFER_SIZE, READ_TIMEOUT_MS,
    WRITE_TIMEOUT_MS,
};
use crate::codec;
use crate::io::{IoManager, ListenerSlot, ReadListener};
use crate::probe::DeviceDescriptor;
use crate::transport::{PortSettings, SharedPort, TransportError, TransportFactory};

struct SessionInner {
    device: Option<DeviceDescriptor>,
    port: Option<SharedPort>,
    parameters: ConnectionParameters,
    state: SessionState,
}

/// One serial session at a time. The port handle exists iff the session is
/// open; the pump is managed by the embedded `IoManager`.
pub struct SerialSession {
    factory: Arc<dyn TransportFactory>,
    inner: Mutex<SessionInner>,
    io: IoManager,
    listeners: ListenerSlot,
}

impl SerialSession {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            inner: Mutex::new(SessionInner {
                device: None,
                port: None,
                parameters: ConnectionParameters::default(),
                state: SessionState::Unopened,
            }),
            io: IoManager::new(),
            listeners: ListenerSlot::new(),
        }
    }

    /// Record the device a permission request selected. Kept until replaced,
    /// including across close and suspend.
    pub async fn select_device(&self, device: DeviceDescriptor) {
        log::info!(
            "Selected serial device {:04x}:{:04x} on {} ({:?})",
            device.vendor_id,
            device.product_id,
            device.port_name,
            device.family
        );
        self.inner.lock().await.device = Some(device);
    }

    pub async fn selected_device(&self) -> Option<DeviceDescriptor> {
        self.inner.lock().await.device.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.port.is_some()
    }

    pub async fn parameters(&self) -> ConnectionParameters {
        self.inner.lock().await.parameters
    }

    pub async fn pump_running(&self) -> bool {
        self.io.is_running().await
    }

    /// Open the selected device with `parameters`. Reopening while already
    /// open replaces the previous port; its pump is stopped and joined first.
    pub async fn open(&self, parameters: ConnectionParameters) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let device = inner.device.clone().ok_or(SerialError::UnknownDriver)?;
        // validation happens strictly before hardware access
        let settings = parameters.port_settings()?;

        let transport = match self.factory.open(&device) {
            Ok(transport) => transport,
            Err(e) => {
                // a partially started pump must not outlive the failed open
                self.io.stop().await;
                log::warn!("openConnection error: {}", e);
                return Err(SerialError::Connection(format!(
                    "cannot open {}: {}",
                    device.port_name, e
                )));
            }
        };

        self.io.stop().await;
        if let Some(old) = inner.port.take() {
            let _ = old.lock().await.close();
        }

        let port: SharedPort = Arc::new(Mutex::new(transport));
        if let Err(e) = Self::configure(&port, &settings, &parameters).await {
            let _ = port.lock().await.close();
            // no port remains; the prior state is kept so a suspended
            // session stays resumable, but a replaced open port is gone
            if inner.state == SessionState::Open {
                inner.state = SessionState::Closed;
            }
            return Err(e);
        }

        inner.parameters = parameters;
        inner.port = Some(port.clone());
        inner.state = SessionState::Open;
        self.io.start(port, self.listeners.clone()).await;
        Ok(())
    }

    async fn configure(
        port: &SharedPort,
        settings: &PortSettings,
        parameters: &ConnectionParameters,
    ) -> Result<()> {
        let mut guard = port.lock().await;
        guard.set_parameters(settings)?;
        // control lines stay low unless explicitly requested
        if parameters.dtr {
            guard.set_dtr(true)?;
        }
        if parameters.rts {
            guard.set_rts(true)?;
        }
        Ok(())
    }

    /// Stop the pump and close the port. Calling close on a closed session
    /// is not an error.
    pub async fn close(&self) -> Result<()> {
        // the session lock is taken before the pump is stopped, same order
        // as open, so a close racing an in-flight open cannot leave the
        // freshly started pump behind
        let mut inner = self.inner.lock().await;
        self.io.stop().await;
        if let Some(port) = inner.port.take() {
            port.lock().await.close()?;
        }
        inner.state = SessionState::Closed;
        Ok(())
    }

    async fn open_port(&self) -> Result<SharedPort> {
        self.inner.lock().await.port.clone().ok_or(SerialError::PortClosed)
    }

    /// Write `data` with the fixed write timeout. Timeout and I/O failure
    /// both surface as a connection error.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        let port = self.open_port().await?;
        let payload = data.to_vec();
        let result = tokio::task::spawn_blocking(move || {
            port.blocking_lock()
                .write(&payload, Duration::from_millis(WRITE_TIMEOUT_MS))
        })
        .await
        .map_err(|e| SerialError::Connection(format!("write task failed: {}", e)))?;
        result.map_err(|e| {
            log::warn!("write error: {}", e);
            SerialError::Connection(format!("write failed: {}", e))
        })
    }

    /// Decode hexadecimal text and write the bytes.
    pub async fn write_hex(&self, text: &str) -> Result<()> {
        if !self.is_open().await {
            return Err(SerialError::PortClosed);
        }
        let bytes = codec::decode_hex(text)?;
        self.write(&bytes).await
    }

    /// One-shot poll with the short read timeout. A transport timeout is a
    /// normal outcome and resolves with whatever was read, possibly nothing.
    pub async fn read_once(&self) -> Result<Vec<u8>> {
        let port = self.open_port().await?;
        let (buf, result) = tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; READ_BUFFER_SIZE];
            let result = port
                .blocking_lock()
                .read(&mut buf, Duration::from_millis(READ_TIMEOUT_MS));
            (buf, result)
        })
        .await
        .map_err(|e| SerialError::Connection(format!("read task failed: {}", e)))?;
        match result {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(TransportError::Timeout) => Ok(Vec::new()),
            Err(e) => {
                log::warn!("read error: {}", e);
                Err(SerialError::Connection(format!("read failed: {}", e)))
            }
        }
    }

    pub fn register_read_callback(&self, listener: ReadListener) {
        self.listeners.register_text(listener);
    }

    pub fn unregister_read_callback(&self) {
        self.listeners.unregister_text();
    }

    pub fn register_read_raw_callback(&self, listener: ReadListener) {
        self.listeners.register_raw(listener);
    }

    pub fn unregister_read_raw_callback(&self) {
        self.listeners.unregister_raw();
    }

    /// Host pause: tear the pump and port down, keep the selected device and
    /// negotiated parameters for resume.
    pub async fn suspend(&self) {
        let mut inner = self.inner.lock().await;
        self.io.stop().await;
        if let Some(port) = inner.port.take() {
            if let Err(e) = port.lock().await.close() {
                log::warn!("close on pause failed: {}", e);
            }
        }
        if inner.state == SessionState::Open {
            inner.state = SessionState::Suspended;
        }
    }

    /// Host resume: best-effort reopen with the retained parameters. Failure
    /// is logged, not surfaced; no pending call exists to reject here.
    pub async fn resume(&self) {
        let (device, parameters) = {
            let inner = self.inner.lock().await;
            if inner.state != SessionState::Suspended {
                return;
            }
            match inner.device.clone() {
                Some(device) => (device, inner.parameters),
                None => return,
            }
        };
        if let Err(e) = self.open(parameters).await {
            log::warn!("Cannot reconnect to {} on resume: {}", device.port_name, e);
        }
    }

    /// Host destroy: final teardown, not resumable.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        self.io.stop().await;
        if let Some(port) = inner.port.take() {
            if let Err(e) = port.lock().await.close() {
                log::warn!("close on destroy failed: {}", e);
            }
        }
        inner.state = SessionState::Closed;
    }
}
