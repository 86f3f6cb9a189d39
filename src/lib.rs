pub mod config;
pub mod core;
pub mod device;
pub mod domain;
pub mod server;
pub mod utils;

pub use crate::config::{CliArgs, Settings};
pub use crate::core::broadcaster::{Broadcaster, ClientChannel};
pub use crate::core::relay::{spawn_relay, RelayHandle, RelayOptions};
pub use crate::device::{open_device, MemoryDevice, SerialDevice};
pub use crate::utils::error::{RelayError, Result};
