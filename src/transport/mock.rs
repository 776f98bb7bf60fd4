//! In-memory port and factory used by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{PortSettings, Result, SerialTransport, TransportError, TransportFactory};
use crate::probe::{AttachedUsbDevice, DeviceDescriptor};

#[derive(Default)]
pub struct MockPortState {
    /// Bytes the host side will read next.
    pub inbound: VecDeque<u8>,
    pub written: Vec<u8>,
    pub settings: Option<PortSettings>,
    pub dtr: bool,
    pub rts: bool,
    pub closed: bool,
    /// Written bytes become readable again, like a loopback plug.
    pub loopback: bool,
    /// Inject one transport run error on the next read.
    pub fail_next_read: bool,
    /// Inject one transport timeout on the next write.
    pub fail_next_write: bool,
    /// Every set_parameters call on this port fails.
    pub fail_configure: bool,
}

pub type SharedMockState = Arc<Mutex<MockPortState>>;

pub struct MockPort {
    state: SharedMockState,
}

fn lock(state: &SharedMockState) -> MutexGuard<'_, MockPortState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SerialTransport for MockPort {
    fn set_parameters(&mut self, settings: &PortSettings) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_configure {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "line settings rejected",
            )));
        }
        state.settings = Some(*settings);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        {
            let mut state = lock(&self.state);
            if state.fail_next_read {
                state.fail_next_read = false;
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "device gone",
                )));
            }
            if !state.inbound.is_empty() {
                let n = buf.len().min(state.inbound.len());
                for slot in buf[..n].iter_mut() {
                    *slot = state.inbound.pop_front().unwrap();
                }
                return Ok(n);
            }
        }
        // no data pending: behave like a short hardware timeout
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
        Err(TransportError::Timeout)
    }

    fn write(&mut self, data: &[u8], _timeout: Duration) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_next_write {
            state.fail_next_write = false;
            return Err(TransportError::Timeout);
        }
        state.written.extend_from_slice(data);
        if state.loopback {
            state.inbound.extend(data.iter().copied());
        }
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        lock(&self.state).dtr = level;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        lock(&self.state).rts = level;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        lock(&self.state).closed = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct MockFactory {
    devices: Mutex<Vec<AttachedUsbDevice>>,
    opened: Mutex<Vec<SharedMockState>>,
    open_count: AtomicUsize,
    fail_open: AtomicBool,
    fail_configure: AtomicBool,
    loopback: AtomicBool,
    open_delay_ms: AtomicUsize,
}

impl MockFactory {
    pub fn with_device(vendor_id: u16, product_id: u16, port_name: &str) -> Arc<Self> {
        let factory = Arc::new(Self::default());
        factory.attach(vendor_id, product_id, port_name);
        factory
    }

    pub fn attach(&self, vendor_id: u16, product_id: u16, port_name: &str) {
        match self.devices.lock() {
            Ok(mut devices) => devices.push(AttachedUsbDevice {
                vendor_id,
                product_id,
                port_name: port_name.to_string(),
            }),
            Err(poisoned) => poisoned.into_inner().push(AttachedUsbDevice {
                vendor_id,
                product_id,
                port_name: port_name.to_string(),
            }),
        }
    }

    pub fn set_loopback(&self, enabled: bool) {
        self.loopback.store(enabled, Ordering::SeqCst);
    }

    pub fn set_fail_open(&self, enabled: bool) {
        self.fail_open.store(enabled, Ordering::SeqCst);
    }

    pub fn set_fail_configure(&self, enabled: bool) {
        self.fail_configure.store(enabled, Ordering::SeqCst);
    }

    /// Make every open stall, like a sluggish platform backend.
    pub fn set_open_delay(&self, delay: Duration) {
        self.open_delay_ms.store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn ports(&self) -> Vec<SharedMockState> {
        match self.opened.lock() {
            Ok(opened) => opened.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last_port(&self) -> SharedMockState {
        self.ports().last().expect("no port opened yet").clone()
    }
}

impl TransportFactory for MockFactory {
    fn attached_devices(&self) -> Result<Vec<AttachedUsbDevice>> {
        match self.devices.lock() {
            Ok(devices) => Ok(devices.clone()),
            Err(poisoned) => Ok(poisoned.into_inner().clone()),
        }
    }

    fn open(&self, _device: &DeviceDescriptor) -> Result<Box<dyn SerialTransport>> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        let delay = self.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay as u64));
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "device detached",
            )));
        }
        let state: SharedMockState = Arc::new(Mutex::new(MockPortState {
            loopback: self.loopback.load(Ordering::SeqCst),
            fail_configure: self.fail_configure.load(Ordering::SeqCst),
            ..MockPortState::default()
        }));
        match self.opened.lock() {
            Ok(mut opened) => opened.push(state.clone()),
            Err(poisoned) => poisoned.into_inner().push(state.clone()),
        }
        Ok(Box::new(MockPort { state }))
    }
}
