use crate::serialize::{HESSIAN2_SERIALIZATION_ID, MAX_SERIALIZATION_ID};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

/// Dubbo protocol version written into request bodies.
pub const DEFAULT_DUBBO_VERSION: &str = "2.0.2";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What the stream decoder does with a well-framed packet whose body cannot be decoded.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MalformedBodyPolicy {
    /// Surface the error; the caller is expected to close the connection.
    Close,
    /// Skip the frame, log it and keep decoding.
    Drop,
}

/// Codec configuration
/// Sizes are in bytes
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Largest body accepted or produced (default: 8 MiB)
    #[serde(default = "default_payload_limit")]
    pub payload_limit: usize,
    /// Handling of undecodable bodies in the stream decoder (default: drop)
    #[serde(default = "default_malformed_body_policy")]
    pub malformed_body_policy: MalformedBodyPolicy,
    /// Protocol version for new requests (default: "2.0.2")
    #[serde(default = "default_dubbo_version")]
    pub dubbo_version: String,
    /// Serialization id for new packages (default: 2, hessian2)
    #[serde(default = "default_serial_id")]
    pub default_serial_id: u8,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            payload_limit: default_payload_limit(),
            malformed_body_policy: default_malformed_body_policy(),
            dubbo_version: default_dubbo_version(),
            default_serial_id: default_serial_id(),
        }
    }
}

fn default_payload_limit() -> usize { 8 * 1024 * 1024 }
fn default_malformed_body_policy() -> MalformedBodyPolicy { MalformedBodyPolicy::Drop }
fn default_dubbo_version() -> String { DEFAULT_DUBBO_VERSION.to_string() }
fn default_serial_id() -> u8 { HESSIAN2_SERIALIZATION_ID }

impl CodecConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CodecConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let config: CodecConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        log::info!(
            "Loaded codec config from {} (payload limit {} bytes, {:?} on malformed body)",
            path.as_ref().display(),
            config.payload_limit,
            config.malformed_body_policy
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payload_limit == 0 {
            return Err(ConfigError::Invalid("payload_limit must be positive".to_string()));
        }
        if u32::try_from(self.payload_limit).is_err() {
            return Err(ConfigError::Invalid(format!(
                "payload_limit {} does not fit the 32-bit length field",
                self.payload_limit
            )));
        }
        if self.default_serial_id > MAX_SERIALIZATION_ID {
            return Err(ConfigError::Invalid(format!(
                "default_serial_id {} does not fit in five bits",
                self.default_serial_id
            )));
        }
        if self.dubbo_version.is_empty() {
            return Err(ConfigError::Invalid("dubbo_version must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = CodecConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CodecConfig::default());
        assert_eq!(config.payload_limit, 8 * 1024 * 1024);
        assert_eq!(config.malformed_body_policy, MalformedBodyPolicy::Drop);
        assert_eq!(config.dubbo_version, "2.0.2");
        assert_eq!(config.default_serial_id, 2);
    }

    #[test]
    fn test_overrides() {
        let config = CodecConfig::from_json_str(
            r#"{"payload_limit": 1024, "malformed_body_policy": "close", "default_serial_id": 6}"#,
        )
        .unwrap();
        assert_eq!(config.payload_limit, 1024);
        assert_eq!(config.malformed_body_policy, MalformedBodyPolicy::Close);
        assert_eq!(config.default_serial_id, 6);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            CodecConfig::from_json_str(r#"{"payload_limit": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CodecConfig::from_json_str(r#"{"default_serial_id": 40}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CodecConfig::from_json_str(r#"{"malformed_body_policy": "ignore"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            CodecConfig::load("/nonexistent/dubbo-codec.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
