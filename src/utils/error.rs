use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to open device {path}: {message}")]
    ConnectError { path: String, message: String },

    #[error("Device transport fault: {message}")]
    TransportFault { message: String },

    #[error("{message}")]
    WriteError { message: String },

    #[error("Device is not connected")]
    NotConnected,

    #[error("Device write did not complete within {timeout_ms}ms")]
    WriteTimeout { timeout_ms: u64 },

    #[error("Relay is not running")]
    RelayUnavailable,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Device,
    Relay,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl RelayError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::ConnectError { .. }
            | RelayError::TransportFault { .. }
            | RelayError::WriteError { .. }
            | RelayError::NotConnected
            | RelayError::WriteTimeout { .. } => ErrorCategory::Device,
            RelayError::RelayUnavailable => ErrorCategory::Relay,
            RelayError::ConfigError { .. }
            | RelayError::InvalidConfigValueError { .. }
            | RelayError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            RelayError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // a process without a working device link is useless
            RelayError::ConnectError { .. } => ErrorSeverity::Critical,
            RelayError::IoError(_) => ErrorSeverity::Critical,
            RelayError::TransportFault { .. } | RelayError::RelayUnavailable => {
                ErrorSeverity::High
            }
            RelayError::ConfigError { .. }
            | RelayError::InvalidConfigValueError { .. }
            | RelayError::ConfigValidationError { .. } => ErrorSeverity::High,
            RelayError::WriteError { .. }
            | RelayError::NotConnected
            | RelayError::WriteTimeout { .. } => ErrorSeverity::Medium,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            RelayError::ConnectError { .. } => {
                "Check that the device is plugged in, the path is correct and you have permission to open it (try --list-ports)"
            }
            RelayError::TransportFault { .. } | RelayError::NotConnected => {
                "Reconnect the device and restart the relay"
            }
            RelayError::WriteError { .. } | RelayError::WriteTimeout { .. } => {
                "Retry the message; if it keeps failing, check the device connection"
            }
            RelayError::RelayUnavailable => "Restart the relay process",
            RelayError::IoError(_) => "Check file permissions and that the address is not already in use",
            RelayError::ConfigError { .. }
            | RelayError::InvalidConfigValueError { .. }
            | RelayError::ConfigValidationError { .. } => {
                "Fix the configuration file or command line flags and try again"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            RelayError::ConnectError { path, .. } => {
                format!("Could not open the device at {}", path)
            }
            RelayError::NotConnected => "The device is disconnected".to_string(),
            RelayError::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid setting '{}': {}", field, reason)
            }
            other => other.to_string(),
        }
    }

    /// Exit code for errors that terminate the process.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
