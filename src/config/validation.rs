use std::path::Path;

use crate::{
    config::models::{GatewayConfig, parse_bind_address},
    core::routes::mount_path_problems,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Invalid TLS configuration: {message}")]
    InvalidTls { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator.
///
/// Unknown handler / resolver names are deliberately not rejected here: the
/// selectors fall back to their defaults for those. The ACME provider name is
/// checked by the transport bootstrapper, which is where it becomes fatal.
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration, collecting every problem.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.address) {
            errors.push(e);
        }

        for (field, message) in mount_path_problems(config) {
            errors.push(ValidationError::InvalidField {
                field: field.to_string(),
                message,
            });
        }

        if config.namespace.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "namespace".to_string(),
            });
        }

        if humantime::parse_duration(&config.shutdown_timeout).is_err() {
            errors.push(ValidationError::InvalidField {
                field: "shutdown_timeout".to_string(),
                message: format!(
                    "'{}' is not a valid duration (e.g. 30s, 1m)",
                    config.shutdown_timeout
                ),
            });
        }

        if config.enable_acme {
            if config.acme_hosts.is_empty() {
                errors.push(ValidationError::InvalidTls {
                    message: "ACME is enabled but no acme_hosts are configured".to_string(),
                });
            }
        } else if config.enable_tls {
            errors.extend(Self::validate_tls_files(config));
        }

        for service in &config.services {
            if service.name.is_empty() {
                errors.push(ValidationError::MissingField {
                    field: "services.name".to_string(),
                });
            }
            for node in &service.nodes {
                if node.address.is_empty() {
                    errors.push(ValidationError::InvalidField {
                        field: format!("services.{}.nodes.{}", service.name, node.id),
                        message: "Node address must not be empty".to_string(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if parse_bind_address(address).is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be ':PORT' or 'IP:PORT' (e.g. ':8080' or '127.0.0.1:3000')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_tls_files(config: &GatewayConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("tls_cert_file", &config.tls_cert_file),
            ("tls_key_file", &config.tls_key_file),
        ] {
            match value {
                None => errors.push(ValidationError::InvalidTls {
                    message: format!("TLS is enabled but {field} is not set"),
                }),
                Some(path) if !Path::new(path).exists() => {
                    errors.push(ValidationError::InvalidTls {
                        message: format!("{field} '{path}' does not exist"),
                    })
                }
                Some(_) => {}
            }
        }
        errors
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        errors
            .iter()
            .enumerate()
            .map(|(i, e)| format!("  {}. {}", i + 1, e))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
