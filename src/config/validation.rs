//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate prefixes, fan-out and addresses
//! - Warn about risky but legal combinations
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ServerConfig;
use crate::net::prefix::ServerPrefix;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.prefixes.is_empty() {
        errors.push(ValidationError::new("listener.prefixes", "at least one prefix is required"));
    }
    for (i, prefix) in config.listener.prefixes.iter().enumerate() {
        if let Err(e) = prefix.parse::<ServerPrefix>() {
            errors.push(ValidationError::new(format!("listener.prefixes[{i}]"), e.to_string()));
        }
    }
    if config.listener.max_concurrent_requests == 0 {
        errors.push(ValidationError::new(
            "listener.max_concurrent_requests",
            "must be greater than zero",
        ));
    }

    if config.dispatch.max_body_bytes == 0 {
        errors.push(ValidationError::new("dispatch.max_body_bytes", "must be greater than zero"));
    }

    for (i, site) in config.sites.iter().enumerate() {
        if site.document_root.trim().is_empty() {
            errors.push(ValidationError::new(format!("sites[{i}].document_root"), "must not be empty"));
        }
    }

    let observability = &config.observability;
    if !matches!(observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}', expected pretty or json", observability.log_format),
        ));
    }
    if observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if config.cors.allow_origin.as_deref().map(str::trim) == Some("*") && config.cors.allow_credentials {
        tracing::warn!("CORS allows any origin with credentials; browsers reject credentialed wildcard responses");
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
    use crate::config::SiteConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServerConfig::default();
        config.listener.prefixes = vec!["ftp://a.test/".into(), "https://a.test/".into()];
        config.listener.max_concurrent_requests = 0;
        config.sites.push(SiteConfig::default());
        config.observability.log_format = "xml".into();
        config.observability.metrics_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.prefixes[0]",
                "listener.prefixes[1]",
                "listener.max_concurrent_requests",
                "sites[0].document_root",
                "observability.log_format",
                "observability.metrics_address",
            ]
        );
    }

    #[test]
    fn zero_body_limit_is_rejected() {
        let mut config = ServerConfig::default();
        config.dispatch.max_body_bytes = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "dispatch.max_body_bytes");
    }

    #[test]
    fn wildcard_with_credentials_is_only_a_warning() {
        let mut config = ServerConfig::default();
        config.cors.allow_origin = Some("*".into());
        assert!(validate_config(&config).is_ok());
    }
}
