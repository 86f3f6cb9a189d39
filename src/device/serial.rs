use crate::config::DeviceSettings;
use crate::core::framing::LineCodec;
use crate::device::LinkState;
use crate::domain::model::{DeviceEvent, LinkStatus};
use crate::domain::ports::DeviceLink;
use crate::utils::error::{RelayError, Result};
use async_trait::async_trait;
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// How long a blocking read waits before checking whether anyone still listens.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READ_BUFFER_SIZE: usize = 1024;

/// Device link over a serial port.
///
/// The port is cloned: a dedicated reader thread owns one handle and turns
/// bytes into records, writes go through the other on the blocking pool.
pub struct SerialDevice {
    writer: Arc<Mutex<Box<dyn SerialPort>>>,
    state: LinkState,
}

impl SerialDevice {
    pub async fn open(
        settings: &DeviceSettings,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DeviceEvent>)> {
        let connect_error = |message: String| RelayError::ConnectError {
            path: settings.path.clone(),
            message,
        };

        tracing::debug!(
            "Opening serial port {} at {} baud",
            settings.path,
            settings.baud_rate
        );

        let path = settings.path.clone();
        let baud_rate = settings.baud_rate;
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(path.as_str(), baud_rate)
                .timeout(READ_POLL_INTERVAL)
                .open()
        })
        .await
        .map_err(|e| connect_error(e.to_string()))?
        .map_err(|e| connect_error(e.to_string()))?;

        let reader = port.try_clone().map_err(|e| connect_error(e.to_string()))?;

        let state = LinkState::new(&settings.path, settings.baud_rate);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let codec = LineCodec::new(settings.terminator);
        let reader_state = state.clone();

        std::thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || read_loop(reader, codec, reader_state, events_tx))
            .map_err(|e| connect_error(format!("failed to start reader thread: {}", e)))?;

        tracing::info!(
            "✅ Serial connection to {} at {} baud established",
            settings.path,
            settings.baud_rate
        );

        Ok((
            Self {
                writer: Arc::new(Mutex::new(port)),
                state,
            },
            events_rx,
        ))
    }
}

#[async_trait]
impl DeviceLink for SerialDevice {
    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        if !self.state.is_open() {
            return Err(RelayError::NotConnected);
        }
        write_on_blocking_pool(self.writer.clone(), frame.to_vec(), self.state.clone()).await
    }

    fn status(&self) -> LinkStatus {
        self.state.snapshot()
    }
}

/// Set when the future waiting on a blocking write is dropped, e.g. by the
/// relay's write timeout.
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Runs a frame write on the blocking pool.
///
/// Dropping the returned future abandons the write: bytes not yet handed to
/// the port are never sent, including when the write is still queued behind
/// the port lock.
async fn write_on_blocking_pool<W>(
    writer: Arc<Mutex<W>>,
    frame: Vec<u8>,
    state: LinkState,
) -> Result<()>
where
    W: Write + Send + 'static,
{
    let abandoned = Arc::new(AtomicBool::new(false));
    let _guard = AbandonOnDrop(abandoned.clone());

    tokio::task::spawn_blocking(move || {
        if abandoned.load(Ordering::SeqCst) {
            return Err(abandoned_error());
        }
        let mut port = writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        write_all_patiently(&mut *port, &frame, &state, &abandoned)
    })
    .await
    .map_err(|e| RelayError::WriteError {
        message: e.to_string(),
    })?
}

/// Writes the whole frame, riding out port timeouts while the link stays open
/// and nobody has given up on the write.
fn write_all_patiently<W: Write + ?Sized>(
    port: &mut W,
    frame: &[u8],
    state: &LinkState,
    abandoned: &AtomicBool,
) -> Result<()> {
    let mut remaining = frame;

    while !remaining.is_empty() {
        if abandoned.load(Ordering::SeqCst) {
            return Err(abandoned_error());
        }
        match port.write(remaining) {
            Ok(0) => {
                return Err(RelayError::WriteError {
                    message: "device accepted no bytes".to_string(),
                })
            }
            Ok(n) => remaining = &remaining[n..],
            Err(e) if is_retryable(&e) => {
                if !state.is_open() {
                    return Err(RelayError::NotConnected);
                }
            }
            Err(e) => {
                return Err(RelayError::WriteError {
                    message: e.to_string(),
                })
            }
        }
    }

    port.flush().map_err(|e| RelayError::WriteError {
        message: e.to_string(),
    })
}

fn abandoned_error() -> RelayError {
    RelayError::WriteError {
        message: "write abandoned before the device accepted it".to_string(),
    }
}

fn is_retryable(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

/// Reads until the transport fails or the relay stops listening.
///
/// On failure the unterminated tail is flushed as a final record, the link is
/// marked closed and a fault is reported.
fn read_loop<R: Read>(
    mut port: R,
    mut codec: LineCodec,
    state: LinkState,
    events: mpsc::UnboundedSender<DeviceEvent>,
) {
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    let reason = loop {
        match port.read(&mut buffer) {
            Ok(0) => break "device closed the connection".to_string(),
            Ok(n) => {
                for record in codec.push(&buffer[..n]) {
                    if events.send(DeviceEvent::Record(record)).is_err() {
                        return;
                    }
                }
            }
            Err(e) if is_retryable(&e) => {
                if events.is_closed() {
                    tracing::debug!("Relay gone, stopping serial reader");
                    return;
                }
            }
            Err(e) => break e.to_string(),
        }
    };

    if let Some(record) = codec.finish() {
        let _ = events.send(DeviceEvent::Record(record));
    }
    state.mark_closed(reason.clone());
    tracing::error!("❌ Serial port error: {}", reason);
    let _ = events.send(DeviceEvent::Fault(reason));
}

/// Serial ports the operating system reports, one description per port.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(|e| RelayError::IoError(e.into()))?;
    Ok(ports.iter().map(describe_port).collect())
}

fn describe_port(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let product = usb
                .product
                .as_deref()
                .or(usb.manufacturer.as_deref())
                .unwrap_or("USB device");
            format!(
                "{} ({} {:04x}:{:04x})",
                info.port_name, product, usb.vid, usb.pid
            )
        }
        SerialPortType::BluetoothPort => format!("{} (Bluetooth)", info.port_name),
        SerialPortType::PciPort => format!("{} (PCI)", info.port_name),
        _ => info.port_name.clone(),
    }
}
