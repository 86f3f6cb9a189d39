use crate::core::framing::{LineCodec, DEFAULT_TERMINATOR};
use crate::device::LinkState;
use crate::domain::model::{DeviceEvent, LinkStatus};
use crate::domain::ports::DeviceLink;
use crate::utils::error::{RelayError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// In-process device link.
///
/// Incoming bytes are injected with [`MemoryDevice::feed`] and go through the
/// same line splitting as a real port. With `echo` enabled every written frame
/// is fed straight back, which is how the firmware behaves.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: LinkState,
    echo: bool,
    codec: Mutex<LineCodec>,
    written: Mutex<Vec<Vec<u8>>>,
    events: mpsc::UnboundedSender<DeviceEvent>,
}

impl MemoryDevice {
    pub fn open(path: &str, echo: bool) -> (Self, mpsc::UnboundedReceiver<DeviceEvent>) {
        Self::with_line_settings(path, 0, DEFAULT_TERMINATOR, echo)
    }

    /// Opens a device that reports `baud_rate` in its status and splits
    /// incoming bytes on `terminator`.
    pub fn with_line_settings(
        path: &str,
        baud_rate: u32,
        terminator: u8,
        echo: bool,
    ) -> (Self, mpsc::UnboundedReceiver<DeviceEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let device = Self {
            inner: Arc::new(Inner {
                state: LinkState::new(path, baud_rate),
                echo,
                codec: Mutex::new(LineCodec::new(terminator)),
                written: Mutex::new(Vec::new()),
                events,
            }),
        };
        (device, receiver)
    }

    /// Simulates bytes arriving from the device. Ignored once disconnected.
    pub fn feed(&self, bytes: &[u8]) {
        if !self.inner.state.is_open() {
            return;
        }
        let records = lock(&self.inner.codec).push(bytes);
        for record in records {
            let _ = self.inner.events.send(DeviceEvent::Record(record));
        }
    }

    /// Simulates the device going away: flushes any partial line, closes the
    /// link and reports the fault.
    pub fn disconnect(&self, reason: &str) {
        if !self.inner.state.mark_closed(reason) {
            return;
        }
        if let Some(record) = lock(&self.inner.codec).finish() {
            let _ = self.inner.events.send(DeviceEvent::Record(record));
        }
        let _ = self.inner.events.send(DeviceEvent::Fault(reason.to_string()));
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        lock(&self.inner.written).clone()
    }

    pub fn written_text(&self) -> Vec<String> {
        self.written()
            .iter()
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .collect()
    }
}

#[async_trait]
impl DeviceLink for MemoryDevice {
    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        if !self.inner.state.is_open() {
            return Err(RelayError::NotConnected);
        }
        lock(&self.inner.written).push(frame.to_vec());
        if self.inner.echo {
            self.feed(frame);
        }
        Ok(())
    }

    fn status(&self) -> LinkStatus {
        self.inner.state.snapshot()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
