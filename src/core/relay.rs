use crate::core::broadcaster::{Broadcaster, ChannelId, ClientChannel};
use crate::core::framing::{LineCodec, DEFAULT_TERMINATOR};
use crate::domain::model::{DeviceEvent, Record, RelayStatus};
use crate::domain::ports::DeviceLink;
use crate::utils::error::{RelayError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub const DEFAULT_ORIGIN_LABEL: &str = "Computadora dice: ";

#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Prepended to every client submission before it is broadcast and written.
    pub origin_label: String,
    pub terminator: u8,
    /// `None` lets a device write take as long as the transport needs.
    pub write_timeout: Option<Duration>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            origin_label: DEFAULT_ORIGIN_LABEL.to_string(),
            terminator: DEFAULT_TERMINATOR,
            write_timeout: None,
        }
    }
}

enum RelayCommand {
    Register {
        reply: oneshot::Sender<ClientChannel>,
    },
    Unregister {
        id: ChannelId,
    },
    Submit {
        message: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Status {
        reply: oneshot::Sender<RelayStatus>,
    },
}

struct WriteJob {
    frame: Vec<u8>,
    reply: oneshot::Sender<Result<()>>,
}

/// Cloneable entry point into the relay task.
#[derive(Clone)]
pub struct RelayHandle {
    commands: mpsc::UnboundedSender<RelayCommand>,
}

impl RelayHandle {
    pub async fn register(&self) -> Result<ClientChannel> {
        let (reply, response) = oneshot::channel();
        self.send(RelayCommand::Register { reply })?;
        response.await.map_err(|_| RelayError::RelayUnavailable)
    }

    pub fn unregister(&self, id: ChannelId) {
        // a stopped relay has no members left to remove
        let _ = self.commands.send(RelayCommand::Unregister { id });
    }

    /// Broadcasts the annotated message, then writes it to the device.
    ///
    /// Resolves with the outcome of the device write. A failed write does not
    /// retract the broadcast.
    pub async fn submit(&self, message: impl Into<String>) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(RelayCommand::Submit {
            message: message.into(),
            reply,
        })?;
        response.await.map_err(|_| RelayError::RelayUnavailable)?
    }

    pub async fn status(&self) -> Result<RelayStatus> {
        let (reply, response) = oneshot::channel();
        self.send(RelayCommand::Status { reply })?;
        response.await.map_err(|_| RelayError::RelayUnavailable)
    }

    fn send(&self, command: RelayCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| RelayError::RelayUnavailable)
    }
}

/// Single owner of the broadcaster and the only writer to the device.
///
/// Device events and commands are handled one at a time. Device writes are
/// queued to a separate writer task so a stalled transport never holds up
/// broadcasts or registrations.
pub struct RelayCore {
    device: Arc<dyn DeviceLink>,
    events: mpsc::UnboundedReceiver<DeviceEvent>,
    commands: mpsc::UnboundedReceiver<RelayCommand>,
    writer: mpsc::UnboundedSender<WriteJob>,
    broadcaster: Broadcaster,
    codec: LineCodec,
    options: RelayOptions,
    records_relayed: u64,
    submissions: u64,
    started_at: DateTime<Utc>,
}

/// Starts the relay and its device writer on the current runtime.
///
/// The relay stops once every `RelayHandle` has been dropped.
pub fn spawn_relay(
    device: Arc<dyn DeviceLink>,
    events: mpsc::UnboundedReceiver<DeviceEvent>,
    options: RelayOptions,
) -> (RelayHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (writer_tx, writer_rx) = mpsc::unbounded_channel();

    tokio::spawn(run_writer(device.clone(), writer_rx, options.write_timeout));

    let core = RelayCore {
        device,
        events,
        commands: command_rx,
        writer: writer_tx,
        broadcaster: Broadcaster::new(),
        codec: LineCodec::new(options.terminator),
        options,
        records_relayed: 0,
        submissions: 0,
        started_at: Utc::now(),
    };

    let handle = RelayHandle {
        commands: command_tx,
    };
    (handle, tokio::spawn(core.run()))
}

impl RelayCore {
    pub async fn run(mut self) {
        let mut device_attached = true;

        loop {
            tokio::select! {
                event = self.events.recv(), if device_attached => match event {
                    Some(DeviceEvent::Record(record)) => self.relay_record(record),
                    Some(DeviceEvent::Fault(message)) => {
                        let fault = RelayError::TransportFault { message };
                        tracing::error!("❌ {} (device link closed, no reconnect)", fault);
                    }
                    None => {
                        tracing::debug!("Device event stream ended");
                        device_attached = false;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        tracing::debug!(
            "Relay stopped after {} records and {} submissions",
            self.records_relayed,
            self.submissions
        );
    }

    fn relay_record(&mut self, record: Record) {
        let delivered = self.broadcaster.broadcast(&record.text);
        self.records_relayed += 1;
        tracing::debug!("Device record relayed to {} clients", delivered);
    }

    fn handle_command(&mut self, command: RelayCommand) {
        match command {
            RelayCommand::Register { reply } => {
                let channel = self.broadcaster.register();
                let id = channel.id();
                if reply.send(channel).is_err() {
                    // requester went away before taking the channel
                    self.broadcaster.unregister(id);
                }
            }
            RelayCommand::Unregister { id } => {
                self.broadcaster.unregister(id);
            }
            RelayCommand::Submit { message, reply } => self.submit(message, reply),
            RelayCommand::Status { reply } => {
                let _ = reply.send(RelayStatus {
                    device: self.device.status(),
                    clients: self.broadcaster.len(),
                    records_relayed: self.records_relayed,
                    submissions: self.submissions,
                    started_at: self.started_at,
                });
            }
        }
    }

    fn submit(&mut self, message: String, reply: oneshot::Sender<Result<()>>) {
        let annotated = format!("{}{}", self.options.origin_label, message);
        self.submissions += 1;

        let delivered = self.broadcaster.broadcast(&annotated);
        tracing::debug!("Submission echoed to {} clients", delivered);

        let job = WriteJob {
            frame: self.codec.encode(&annotated),
            reply,
        };
        if let Err(mpsc::error::SendError(job)) = self.writer.send(job) {
            let _ = job.reply.send(Err(RelayError::RelayUnavailable));
        }
    }
}

async fn run_writer(
    device: Arc<dyn DeviceLink>,
    mut jobs: mpsc::UnboundedReceiver<WriteJob>,
    write_timeout: Option<Duration>,
) {
    while let Some(job) = jobs.recv().await {
        let result = write_frame(device.as_ref(), &job.frame, write_timeout).await;
        if let Err(e) = &result {
            tracing::warn!("⚠️ Device write failed: {}", e);
        }
        // the submitter may have given up waiting
        let _ = job.reply.send(result);
    }
}

async fn write_frame(
    device: &dyn DeviceLink,
    frame: &[u8],
    write_timeout: Option<Duration>,
) -> Result<()> {
    match write_timeout {
        Some(limit) => tokio::time::timeout(limit, device.write_frame(frame))
            .await
            .unwrap_or(Err(RelayError::WriteTimeout {
                timeout_ms: limit.as_millis() as u64,
            })),
        None => device.write_frame(frame).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::memory::MemoryDevice;
    use crate::domain::model::LinkStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    fn relay_with(
        device: &MemoryDevice,
        events: mpsc::UnboundedReceiver<DeviceEvent>,
    ) -> RelayHandle {
        let (handle, _task) =
            spawn_relay(Arc::new(device.clone()), events, RelayOptions::default());
        handle
    }

    /// Records what a client channel had already received when each write arrived.
    struct ProbeDevice {
        probe: Mutex<ClientChannel>,
        log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DeviceLink for ProbeDevice {
        async fn write_frame(&self, frame: &[u8]) -> Result<()> {
            let mut log = self.log.lock().unwrap();
            while let Some(seen) = self.probe.lock().unwrap().try_recv() {
                log.push(format!("broadcast:{}", seen));
            }
            log.push(format!("write:{}", String::from_utf8_lossy(frame)));
            Ok(())
        }

        fn status(&self) -> LinkStatus {
            LinkStatus {
                path: "probe".to_string(),
                baud_rate: 0,
                open: true,
                last_error: None,
            }
        }
    }

    #[tokio::test]
    async fn test_device_records_reach_clients_in_order() {
        let (device, events) = MemoryDevice::open("mem", false);
        let relay = relay_with(&device, events);
        let mut client = relay.register().await.unwrap();

        device.feed(b"first\nsecond\nthi");
        device.feed(b"rd\n");

        assert_eq!(client.recv().await.as_deref(), Some("first"));
        assert_eq!(client.recv().await.as_deref(), Some("second"));
        assert_eq!(client.recv().await.as_deref(), Some("third"));
    }

    #[tokio::test]
    async fn test_submission_is_broadcast_then_written() {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (_events_tx, events_rx) = mpsc::unbounded_channel();

        let mut broadcaster = Broadcaster::new();
        let probe = broadcaster.register();
        let mut watcher = broadcaster.register();

        let device = Arc::new(ProbeDevice {
            probe: Mutex::new(probe),
            log: Mutex::new(Vec::new()),
        });
        tokio::spawn(run_writer(device.clone(), writer_rx, None));

        let core = RelayCore {
            device: device.clone(),
            events: events_rx,
            commands: command_rx,
            writer: writer_tx,
            broadcaster,
            codec: LineCodec::default(),
            options: RelayOptions::default(),
            records_relayed: 0,
            submissions: 0,
            started_at: Utc::now(),
        };
        tokio::spawn(core.run());
        let relay = RelayHandle {
            commands: command_tx,
        };

        assert_ok!(relay.submit("hello").await);

        assert_eq!(
            *device.log.lock().unwrap(),
            vec![
                "broadcast:Computadora dice: hello".to_string(),
                "write:Computadora dice: hello\n".to_string(),
            ]
        );
        assert_eq!(watcher.try_recv().as_deref(), Some("Computadora dice: hello"));
        assert_eq!(watcher.try_recv(), None);
    }

    #[tokio::test]
    async fn test_submission_writes_exactly_one_frame() {
        let (device, events) = MemoryDevice::open("mem", false);
        let relay = relay_with(&device, events);
        let mut client = relay.register().await.unwrap();

        assert_ok!(relay.submit("hello").await);

        assert_eq!(device.written(), vec![b"Computadora dice: hello\n".to_vec()]);
        assert_eq!(client.recv().await.as_deref(), Some("Computadora dice: hello"));
        assert_eq!(client.try_recv(), None);
    }

    #[tokio::test]
    async fn test_closed_device_still_broadcasts() {
        let (device, events) = MemoryDevice::open("mem", false);
        let relay = relay_with(&device, events);
        let mut client = relay.register().await.unwrap();
        device.disconnect("unplugged");

        let err = assert_err!(relay.submit("are you there?").await);
        assert!(matches!(err, RelayError::NotConnected));

        assert_eq!(
            client.recv().await.as_deref(),
            Some("Computadora dice: are you there?")
        );
        assert!(device.written().is_empty());

        let status = relay.status().await.unwrap();
        assert!(!status.device.open);
        assert_eq!(status.device.last_error.as_deref(), Some("unplugged"));
    }

    #[tokio::test]
    async fn test_submissions_are_written_in_order() {
        let (device, events) = MemoryDevice::open("mem", false);
        let relay = relay_with(&device, events);

        let first = relay.submit("1");
        let second = relay.submit("2");
        let (a, b) = tokio::join!(first, second);
        assert_ok!(a);
        assert_ok!(b);

        assert_eq!(
            device.written_text(),
            vec!["Computadora dice: 1\n", "Computadora dice: 2\n"]
        );
    }

    #[tokio::test]
    async fn test_late_client_misses_earlier_records() {
        let (device, events) = MemoryDevice::open("mem", false);
        let relay = relay_with(&device, events);
        let mut early = relay.register().await.unwrap();

        device.feed(b"before\n");
        assert_eq!(early.recv().await.as_deref(), Some("before"));

        let mut late = relay.register().await.unwrap();
        device.feed(b"after\n");

        assert_eq!(late.recv().await.as_deref(), Some("after"));
        assert_eq!(early.recv().await.as_deref(), Some("after"));
    }

    #[tokio::test]
    async fn test_unregister_twice_is_harmless() {
        let (device, events) = MemoryDevice::open("mem", false);
        let relay = relay_with(&device, events);
        let client = relay.register().await.unwrap();

        relay.unregister(client.id());
        relay.unregister(client.id());

        assert_eq!(relay.status().await.unwrap().clients, 0);
    }

    #[tokio::test]
    async fn test_status_counts_traffic() {
        let (device, events) = MemoryDevice::open("mem", false);
        let relay = relay_with(&device, events);
        let mut client = relay.register().await.unwrap();

        device.feed(b"a\nb\n");
        client.recv().await;
        client.recv().await;
        assert_ok!(relay.submit("x").await);

        let status = relay.status().await.unwrap();
        assert_eq!(status.clients, 1);
        assert_eq!(status.records_relayed, 2);
        assert_eq!(status.submissions, 1);
        assert!(status.device.open);
    }

    struct StalledDevice;

    #[async_trait]
    impl DeviceLink for StalledDevice {
        async fn write_frame(&self, _frame: &[u8]) -> Result<()> {
            std::future::pending().await
        }

        fn status(&self) -> LinkStatus {
            LinkStatus {
                path: "stalled".to_string(),
                baud_rate: 9600,
                open: true,
                last_error: None,
            }
        }
    }

    #[tokio::test]
    async fn test_write_timeout_reports_failure() {
        let (_events_tx, events_rx) = mpsc::unbounded_channel();
        let options = RelayOptions {
            write_timeout: Some(Duration::from_millis(20)),
            ..RelayOptions::default()
        };
        let (relay, _task) = spawn_relay(Arc::new(StalledDevice), events_rx, options);

        let err = assert_err!(relay.submit("ping").await);
        assert!(matches!(err, RelayError::WriteTimeout { timeout_ms: 20 }));
    }

    #[tokio::test]
    async fn test_stalled_write_does_not_block_broadcasts() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (relay, _task) =
            spawn_relay(Arc::new(StalledDevice), events_rx, RelayOptions::default());
        let mut client = relay.register().await.unwrap();

        let pending = tokio::spawn({
            let relay = relay.clone();
            async move { relay.submit("stuck").await }
        });
        assert_eq!(client.recv().await.as_deref(), Some("Computadora dice: stuck"));

        events_tx
            .send(DeviceEvent::Record(Record::from("still flowing")))
            .unwrap();
        assert_eq!(client.recv().await.as_deref(), Some("still flowing"));

        let other = relay.register().await.unwrap();
        assert_eq!(relay.status().await.unwrap().clients, 2);
        relay.unregister(other.id());
        assert!(!pending.is_finished());
        pending.abort();
    }
}
