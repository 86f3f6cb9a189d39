pub mod broadcaster;
pub mod framing;
pub mod relay;

pub use crate::domain::model::{DeviceEvent, Record};
pub use crate::domain::ports::DeviceLink;
pub use crate::utils::error::Result;
