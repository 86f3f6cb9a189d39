use crate::utils::error::{RelayError, Result};
use std::net::SocketAddr;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_device_path(field_name: &str, path: &str) -> Result<()> {
    validate_non_empty_string(field_name, path)?;

    if path.contains('\0') {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

pub fn validate_bind_address(field_name: &str, host: &str, port: u16) -> Result<SocketAddr> {
    validate_positive_number(field_name, u64::from(port), 1)?;

    format!("{}:{}", host, port)
        .parse::<SocketAddr>()
        .or_else(|_| format!("[{}]:{}", host, port).parse::<SocketAddr>())
        .map_err(|e| RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: host.to_string(),
            reason: format!("Invalid bind address: {}", e),
        })
}

/// Parses a record terminator given as an escape (`\n`, `\r`, `\0`, `\t`)
/// or a single ASCII character.
pub fn parse_terminator(field_name: &str, value: &str) -> Result<u8> {
    let byte = match value {
        "\\n" | "\n" => b'\n',
        "\\r" | "\r" => b'\r',
        "\\0" | "\0" => b'\0',
        "\\t" | "\t" => b'\t',
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii() => c as u8,
                _ => {
                    return Err(RelayError::InvalidConfigValueError {
                        field: field_name.to_string(),
                        value: value.to_string(),
                        reason: "Terminator must be a single ASCII character or one of \\n, \\r, \\0, \\t"
                            .to_string(),
                    })
                }
            }
        }
    };
    Ok(byte)
}
