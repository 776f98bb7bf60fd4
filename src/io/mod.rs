//! Background duplex pump: continuous reads from the open port, delivered to
//! the registered listeners over a channel, with a join-on-stop contract.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use base64::Engine;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::session::{SerialError, READ_BUFFER_SIZE, READ_TIMEOUT_MS};
use crate::transport::{SharedPort, TransportError};

/// One inbound delivery to a registered listener.
#[derive(Debug, Clone)]
pub enum ReadEvent {
    /// UTF-8 text for plain registrations, base64 for raw registrations.
    Data(String),
    /// Terminal pump failure for this run; the caller must reopen.
    Error(SerialError),
}

pub type ReadListener = Box<dyn Fn(ReadEvent) + Send + Sync>;

#[derive(Default)]
struct Registrations {
    text: Option<ReadListener>,
    raw: Option<ReadListener>,
}

/// One-slot listener registry. Registering replaces the previous listener
/// without error; registrations outlive close/reopen cycles.
#[derive(Clone, Default)]
pub struct ListenerSlot {
    inner: Arc<StdMutex<Registrations>>,
}

impl ListenerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registrations> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn register_text(&self, listener: ReadListener) {
        log::info!("Registering read callback");
        self.lock().text = Some(listener);
    }

    pub fn unregister_text(&self) {
        log::info!("Unregistering read callback");
        self.lock().text = None;
    }

    pub fn register_raw(&self, listener: ReadListener) {
        log::info!("Registering raw read callback");
        self.lock().raw = Some(listener);
    }

    pub fn unregister_raw(&self) {
        log::info!("Unregistering raw read callback");
        self.lock().raw = None;
    }

    fn deliver_chunk(&self, bytes: &[u8]) {
        let guard = self.lock();
        if let Some(listener) = &guard.text {
            listener(ReadEvent::Data(String::from_utf8_lossy(bytes).into_owned()));
        }
        if let Some(listener) = &guard.raw {
            listener(ReadEvent::Data(
                base64::engine::general_purpose::STANDARD.encode(bytes),
            ));
        }
    }

    fn deliver_error(&self, error: SerialError) {
        let guard = self.lock();
        if let Some(listener) = &guard.text {
            listener(ReadEvent::Error(error.clone()));
        }
        if let Some(listener) = &guard.raw {
            listener(ReadEvent::Error(error));
        }
    }
}

enum PumpEvent {
    Data(Vec<u8>),
    Fatal(TransportError),
}

struct PumpHandle {
    shutdown: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    delivery: JoinHandle<()>,
}

/// Owns the at-most-one background pump bound to the open port.
#[derive(Default)]
pub struct IoManager {
    active: Mutex<Option<PumpHandle>>,
    starts: AtomicU64,
}

impl IoManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin pumping `port`. Any previous pump is stopped and joined first,
    /// so exactly one pump is ever active.
    pub async fn start(&self, port: SharedPort, listeners: ListenerSlot) {
        self.stop().await;
        log::info!("Starting serial I/O pump");

        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::task::spawn_blocking({
            let shutdown = shutdown.clone();
            move || pump_loop(port, shutdown, tx)
        });
        let delivery = tokio::spawn(delivery_loop(rx, listeners));

        self.starts.fetch_add(1, Ordering::Relaxed);
        *self.active.lock().await = Some(PumpHandle {
            shutdown,
            reader,
            delivery,
        });
    }

    /// Signal the pump to end and wait for both tasks to quiesce. No-op when
    /// nothing is running.
    pub async fn stop(&self) {
        let handle = self.active.lock().await.take();
        if let Some(handle) = handle {
            log::info!("Stopping serial I/O pump");
            handle.shutdown.store(true, Ordering::Relaxed);
            let _ = handle.reader.await;
            let _ = handle.delivery.await;
        }
    }

    /// Whether a pump is live. A pump that died on a run error counts as
    /// stopped; its handle is dropped here.
    pub async fn is_running(&self) -> bool {
        let mut active = self.active.lock().await;
        match active.as_ref() {
            Some(handle) if handle.reader.is_finished() && handle.delivery.is_finished() => {
                *active = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Number of pump starts since creation.
    pub fn starts(&self) -> u64 {
        self.starts.load(Ordering::Relaxed)
    }
}

fn pump_loop(
    port: SharedPort,
    shutdown: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<PumpEvent>,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    while !shutdown.load(Ordering::Relaxed) {
        let result = port
            .blocking_lock()
            .read(&mut buf, Duration::from_millis(READ_TIMEOUT_MS));
        match result {
            Ok(0) => {}
            Ok(n) => {
                if tx.send(PumpEvent::Data(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(TransportError::Timeout) => {}
            Err(e) => {
                let _ = tx.send(PumpEvent::Fatal(e));
                break;
            }
        }
    }
}

async fn delivery_loop(mut rx: mpsc::UnboundedReceiver<PumpEvent>, listeners: ListenerSlot) {
    while let Some(event) = rx.recv().await {
        match event {
            PumpEvent::Data(bytes) => listeners.deliver_chunk(&bytes),
            PumpEvent::Fatal(e) => {
                log::warn!("Serial I/O pump run error: {}", e);
                listeners.deliver_error(SerialError::Connection(e.to_string()));
                break;
            }
        }
    }
}
