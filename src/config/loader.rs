//! Configuration loading from disk.

use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Wrapper so a list of validation errors renders as one message.
#[derive(Debug)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(|errors| ConfigError::Validation(ValidationErrors(errors)))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PolicyKind;

    #[test]
    fn minimal_toml_round_trips_with_defaults() {
        let raw = r#"
            [[backends]]
            id = "a"
            endpoint = "http://127.0.0.1:3000"

            [scoring]
            policy = "learned"
            epsilon = 0.1
        "#;
        let config: ProxyConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.scoring.policy, PolicyKind::Learned);
        assert_eq!(config.scoring.epsilon, 0.1);
        // untouched sections keep their defaults
        assert_eq!(config.probe.interval_ms, 5000);
        assert_eq!(config.poll.path, "/metrics");
        assert!(validate_config(&config).is_ok());
    }
}
