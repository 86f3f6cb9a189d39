use crate::config::{DeviceKind, Settings};
use crate::utils::error::Result;
use crate::utils::logger::LogFormat;
use crate::utils::validation::parse_terminator;
use clap::Parser;
use std::path::PathBuf;

/// Command-line flags. Anything given here overrides the TOML file.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "serial-relay")]
#[command(about = "Relays a serial-attached microcontroller to browser clients over WebSocket")]
pub struct CliArgs {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial device path (e.g. /dev/ttyUSB0 or COM3)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Serial bit rate
    #[arg(short, long)]
    pub baud_rate: Option<u32>,

    /// Record terminator: \n, \r, \0, \t or a single ASCII character
    #[arg(long)]
    pub terminator: Option<String>,

    /// Use an in-memory echo device instead of a serial port
    #[arg(long)]
    pub loopback: bool,

    /// Address the HTTP server binds to
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP / WebSocket port
    #[arg(short = 'p', long)]
    pub http_port: Option<u16>,

    /// Label prepended to messages submitted by clients
    #[arg(long)]
    pub origin_label: Option<String>,

    /// Give up on a device write after this many milliseconds
    #[arg(long)]
    pub write_timeout_ms: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// List available serial ports and exit
    #[arg(long)]
    pub list_ports: bool,
}

impl CliArgs {
    pub fn apply_to(&self, settings: &mut Settings) -> Result<()> {
        if let Some(device) = &self.device {
            settings.device.path = device.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            settings.device.baud_rate = baud_rate;
        }
        if let Some(terminator) = &self.terminator {
            settings.device.terminator = parse_terminator("--terminator", terminator)?;
        }
        if self.loopback {
            settings.device.kind = DeviceKind::Loopback;
        }
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.http_port {
            settings.server.port = port;
        }
        if let Some(label) = &self.origin_label {
            settings.relay.origin_label = label.clone();
        }
        if let Some(timeout) = self.write_timeout_ms {
            settings.relay.write_timeout_ms = Some(timeout);
        }
        if self.verbose {
            settings.logging.verbose = true;
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = CliArgs::parse_from([
            "serial-relay",
            "--device",
            "COM3",
            "--baud-rate",
            "9600",
            "--terminator",
            "\\r",
            "-p",
            "8080",
            "--origin-label",
            "PC: ",
            "--log-format",
            "json",
        ]);

        let mut settings = Settings::default();
        args.apply_to(&mut settings).unwrap();

        assert_eq!(settings.device.path, "COM3");
        assert_eq!(settings.device.baud_rate, 9600);
        assert_eq!(settings.device.terminator, b'\r');
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.relay.origin_label, "PC: ");
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.device.kind, DeviceKind::Serial);
    }

    #[test]
    fn test_absent_flags_leave_settings_alone() {
        let args = CliArgs::parse_from(["serial-relay"]);
        let mut settings = Settings::default();
        settings.server.port = 4000;

        args.apply_to(&mut settings).unwrap();
        assert_eq!(settings.server.port, 4000);
        assert_eq!(settings, {
            let mut expected = Settings::default();
            expected.server.port = 4000;
            expected
        });
    }

    #[test]
    fn test_bad_terminator_flag_is_rejected() {
        let args = CliArgs::parse_from(["serial-relay", "--terminator", "crlf"]);
        let mut settings = Settings::default();
        assert!(args.apply_to(&mut settings).is_err());
    }
}
