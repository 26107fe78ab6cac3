//! Configuration validation.
//!
//! Semantic checks on top of serde's syntactic ones: unique backend ids,
//! parseable endpoints, intervals and tuning constants in range. All errors
//! are collected and returned together, not just the first.

use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("no backends configured")]
    NoBackends,

    #[error("duplicate backend id `{0}`")]
    DuplicateId(String),

    #[error("backend `{id}` has invalid endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint {
        id: String,
        endpoint: String,
        reason: String,
    },

    #[error("`{0}` must be greater than zero")]
    NonPositive(&'static str),

    #[error("`{0}` must lie in [0, 1]")]
    OutOfUnitRange(&'static str),
}

/// Validate a parsed configuration, returning every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    let mut seen = HashSet::new();
    for backend in &config.backends {
        if !seen.insert(backend.id.as_str()) {
            errors.push(ValidationError::DuplicateId(backend.id.clone()));
        }
        if let Err(e) = Url::parse(&backend.endpoint) {
            errors.push(ValidationError::InvalidEndpoint {
                id: backend.id.clone(),
                endpoint: backend.endpoint.clone(),
                reason: e.to_string(),
            });
        }
    }

    for (name, value) in [
        ("probe.interval_ms", config.probe.interval_ms),
        ("probe.timeout_ms", config.probe.timeout_ms),
        ("poll.interval_ms", config.poll.interval_ms),
        ("poll.timeout_ms", config.poll.timeout_ms),
        ("scoring.persist_interval_ms", config.scoring.persist_interval_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::NonPositive(name));
        }
    }

    for (name, value) in [
        ("probe.ewma_alpha", config.probe.ewma_alpha),
        ("poll.ewma_alpha", config.poll.ewma_alpha),
        ("scoring.epsilon", config.scoring.epsilon),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ValidationError::OutOfUnitRange(name));
        }
    }

    if config.scoring.learning_rate <= 0.0 {
        errors.push(ValidationError::NonPositive("scoring.learning_rate"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BackendConfig;

    fn two_backend_config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.backends.push(BackendConfig {
            id: "a".into(),
            endpoint: "http://127.0.0.1:3000".into(),
        });
        config.backends.push(BackendConfig {
            id: "b".into(),
            endpoint: "http://127.0.0.1:3002".into(),
        });
        config
    }

    #[test]
    fn default_pool_is_rejected_as_empty() {
        let errors = validate_config(&ProxyConfig::default()).unwrap_err();
        assert!(errors.contains(&ValidationError::NoBackends));
    }

    #[test]
    fn valid_two_backend_config_passes() {
        assert!(validate_config(&two_backend_config()).is_ok());
    }

    #[test]
    fn all_errors_are_reported_together() {
        let mut config = two_backend_config();
        config.backends[1].id = "a".into();
        config.backends[1].endpoint = "not a url".into();
        config.probe.interval_ms = 0;
        config.scoring.epsilon = 1.5;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicateId("a".into())));
        assert!(errors.contains(&ValidationError::NonPositive("probe.interval_ms")));
        assert!(errors.contains(&ValidationError::OutOfUnitRange("scoring.epsilon")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidEndpoint { id, .. } if id == "a")));
    }
}
