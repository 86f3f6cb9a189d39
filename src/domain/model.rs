use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of text exchanged with the device, terminator stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub text: String,
}

impl Record {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl From<&str> for Record {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// What a device link reports to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Record(Record),
    /// The transport failed after opening; the link is now closed.
    Fault(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatus {
    pub path: String,
    pub baud_rate: u32,
    pub open: bool,
    pub last_error: Option<String>,
}

/// Body of the inbound submission endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAck {
    pub status: String,
}

impl SubmitAck {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayStatus {
    pub device: LinkStatus,
    pub clients: usize,
    pub records_relayed: u64,
    pub submissions: u64,
    pub started_at: DateTime<Utc>,
}
