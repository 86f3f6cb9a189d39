pub mod memory;
pub mod serial;

use crate::config::{DeviceKind, DeviceSettings};
use crate::domain::model::{DeviceEvent, LinkStatus};
use crate::domain::ports::DeviceLink;
use crate::utils::error::Result;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

pub use memory::MemoryDevice;
pub use serial::SerialDevice;

/// Open/closed state of a link, shared by its reader and writer halves.
///
/// A link starts open and can only move to closed.
#[derive(Debug, Clone)]
pub struct LinkState {
    inner: Arc<Mutex<LinkStatus>>,
}

impl LinkState {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LinkStatus {
                path: path.into(),
                baud_rate,
                open: true,
                last_error: None,
            })),
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Marks the link closed. Returns false if it was already closed.
    pub fn mark_closed(&self, reason: impl Into<String>) -> bool {
        let mut status = self.lock();
        let was_open = status.open;
        status.open = false;
        status.last_error = Some(reason.into());
        was_open
    }

    pub fn snapshot(&self) -> LinkStatus {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, LinkStatus> {
        // no invariant spans the fields, so a poisoned guard is still usable
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Opens the configured device link.
///
/// Failure here is a startup error; the caller is expected to stop the process.
pub async fn open_device(
    settings: &DeviceSettings,
) -> Result<(Arc<dyn DeviceLink>, mpsc::UnboundedReceiver<DeviceEvent>)> {
    match settings.kind {
        DeviceKind::Serial => {
            let (device, events) = SerialDevice::open(settings).await?;
            Ok((Arc::new(device), events))
        }
        DeviceKind::Loopback => {
            tracing::info!("🔁 Using in-memory loopback device instead of a serial port");
            let (device, events) = MemoryDevice::with_line_settings(
                &settings.path,
                settings.baud_rate,
                settings.terminator,
                true,
            );
            Ok((Arc::new(device), events))
        }
    }
}
