use std::collections::HashMap;
use tokio::sync::mpsc;

pub type ChannelId = u64;

/// Receiving end of one push-channel membership.
#[derive(Debug)]
pub struct ClientChannel {
    id: ChannelId,
    receiver: mpsc::UnboundedReceiver<String>,
}

impl ClientChannel {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Next broadcast text, or `None` once the channel has been unregistered.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

/// Fan-out of text to every registered client channel.
///
/// Sole owner of the membership set. Delivery never blocks: each member has an
/// unbounded queue that its socket task drains.
#[derive(Debug, Default)]
pub struct Broadcaster {
    next_id: ChannelId,
    members: HashMap<ChannelId, mpsc::UnboundedSender<String>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self) -> ClientChannel {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_id;
        self.next_id += 1;
        self.members.insert(id, sender);
        tracing::debug!("Channel {} registered ({} open)", id, self.members.len());
        ClientChannel { id, receiver }
    }

    /// Removes a channel. Returns whether it was still a member; removing an
    /// absent channel is a no-op.
    pub fn unregister(&mut self, id: ChannelId) -> bool {
        let removed = self.members.remove(&id).is_some();
        if removed {
            tracing::debug!("Channel {} unregistered ({} open)", id, self.members.len());
        }
        removed
    }

    /// Delivers `text` to every open channel and returns how many received it.
    ///
    /// Closed channels are dropped from the set without error.
    pub fn broadcast(&mut self, text: &str) -> usize {
        let mut delivered = 0;
        self.members.retain(|id, sender| {
            if sender.is_closed() {
                tracing::debug!("Dropping closed channel {}", id);
                return false;
            }
            match sender.send(text.to_owned()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
