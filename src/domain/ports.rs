use crate::domain::model::LinkStatus;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Outbound half of a device connection.
///
/// Incoming records are not part of this trait: a link is opened together with
/// a `DeviceEvent` receiver which the relay drains.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Sends an already-terminated frame.
    ///
    /// `Ok` means the local transport accepted the bytes. There is no
    /// acknowledgment from the device itself.
    async fn write_frame(&self, frame: &[u8]) -> Result<()>;

    fn status(&self) -> LinkStatus;
}
