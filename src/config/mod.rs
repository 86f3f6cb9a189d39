pub mod cli;
pub mod toml_config;

pub use cli::CliArgs;
pub use toml_config::TomlConfig;

use crate::core::framing::DEFAULT_TERMINATOR;
use crate::core::relay::{RelayOptions, DEFAULT_ORIGIN_LABEL};
use crate::utils::error::Result;
use crate::utils::logger::LogFormat;
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_DEVICE_PATH: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 3000;

const MIN_BAUD_RATE: u32 = 50;
const MAX_BAUD_RATE: u32 = 4_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Serial,
    /// In-memory device that echoes every write back.
    Loopback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    pub kind: DeviceKind,
    pub path: String,
    pub baud_rate: u32,
    pub terminator: u8,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Serial,
            path: DEFAULT_DEVICE_PATH.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            terminator: DEFAULT_TERMINATOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub origin_label: String,
    pub write_timeout_ms: Option<u64>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            origin_label: DEFAULT_ORIGIN_LABEL.to_string(),
            write_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    pub verbose: bool,
    pub format: LogFormat,
}

/// Fully resolved configuration: defaults, then the TOML file, then flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub device: DeviceSettings,
    pub server: ServerSettings,
    pub relay: RelaySettings,
    pub logging: LoggingSettings,
}

impl Settings {
    pub fn load(args: &CliArgs) -> Result<Self> {
        let mut settings = Settings::default();

        if let Some(path) = &args.config {
            TomlConfig::from_file(path)?.apply_to(&mut settings)?;
        }
        args.apply_to(&mut settings)?;

        Ok(settings)
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        validation::validate_bind_address("server.host", &self.server.host, self.server.port)
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            origin_label: self.relay.origin_label.clone(),
            terminator: self.device.terminator,
            write_timeout: self.relay.write_timeout_ms.map(Duration::from_millis),
        }
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validation::validate_device_path("device.path", &self.device.path)?;
        validation::validate_range(
            "device.baud_rate",
            self.device.baud_rate,
            MIN_BAUD_RATE,
            MAX_BAUD_RATE,
        )?;
        validation::validate_range("device.terminator", self.device.terminator, 0, 0x7f)?;
        self.bind_address()?;

        if let Some(timeout) = self.relay.write_timeout_ms {
            validation::validate_positive_number("relay.write_timeout_ms", timeout, 1)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.device.baud_rate, 115_200);
        assert_eq!(settings.device.terminator, b'\n');
        assert_eq!(settings.bind_address().unwrap().port(), 3000);
        assert_eq!(settings.relay.origin_label, "Computadora dice: ");
    }

    #[test]
    fn test_relay_options_follow_settings() {
        let mut settings = Settings::default();
        settings.relay.write_timeout_ms = Some(250);
        settings.device.terminator = b'\r';

        let options = settings.relay_options();
        assert_eq!(options.write_timeout, Some(Duration::from_millis(250)));
        assert_eq!(options.terminator, b'\r');
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let mut settings = Settings::default();
        settings.device.baud_rate = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.relay.write_timeout_ms = Some(0);
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.device.path = String::new();
        assert!(settings.validate().is_err());
    }
}
