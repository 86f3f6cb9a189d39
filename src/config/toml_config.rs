use crate::config::{DeviceKind, Settings};
use crate::utils::error::{RelayError, Result};
use crate::utils::logger::LogFormat;
use crate::utils::validation::parse_terminator;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk configuration. Every key is optional; missing keys keep their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub device: Option<DeviceSection>,
    pub server: Option<ServerSection>,
    pub relay: Option<RelaySection>,
    pub logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSection {
    pub kind: Option<DeviceKind>,
    pub path: Option<String>,
    pub baud_rate: Option<u32>,
    pub terminator: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelaySection {
    pub origin_label: Option<String>,
    pub write_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    pub verbose: Option<bool>,
    pub format: Option<LogFormat>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| RelayError::ConfigError {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| RelayError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR_NAME}` with the variable's value. Unset variables are
    /// left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| RelayError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn apply_to(&self, settings: &mut Settings) -> Result<()> {
        if let Some(device) = &self.device {
            if let Some(kind) = device.kind {
                settings.device.kind = kind;
            }
            if let Some(path) = &device.path {
                settings.device.path = path.clone();
            }
            if let Some(baud_rate) = device.baud_rate {
                settings.device.baud_rate = baud_rate;
            }
            if let Some(terminator) = &device.terminator {
                settings.device.terminator = parse_terminator("device.terminator", terminator)?;
            }
        }

        if let Some(server) = &self.server {
            if let Some(host) = &server.host {
                settings.server.host = host.clone();
            }
            if let Some(port) = server.port {
                settings.server.port = port;
            }
        }

        if let Some(relay) = &self.relay {
            if let Some(label) = &relay.origin_label {
                settings.relay.origin_label = label.clone();
            }
            if relay.write_timeout_ms.is_some() {
                settings.relay.write_timeout_ms = relay.write_timeout_ms;
            }
        }

        if let Some(logging) = &self.logging {
            if let Some(verbose) = logging.verbose {
                settings.logging.verbose = verbose;
            }
            if let Some(format) = logging.format {
                settings.logging.format = format;
            }
        }

        Ok(())
    }
}
