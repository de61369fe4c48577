use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::config::models::GatewayConfig;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid URL in field '{field}': {url} - {reason}")]
    InvalidUrl {
        field: String,
        url: String,
        reason: String,
    },

    #[error("Invalid TLS configuration: {message}")]
    InvalidTls { message: String },
}

pub type ValidationResult<T> = Result<T, ValidationError>;

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$")
        .expect("domain regex is valid")
});

/// Configuration validator with collected error reporting.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a complete gateway configuration.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if config.server_domain.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "server_domain".to_string(),
            });
        } else if !Self::is_valid_domain(&config.server_domain) {
            errors.push(ValidationError::InvalidField {
                field: "server_domain".to_string(),
                message: format!("'{}' is not a valid domain name", config.server_domain),
            });
        }

        if let Err(err) = Self::validate_url(&config.backend_url, "backend_url") {
            errors.push(err);
        }
        if let Some(default_backend) = &config.default_backend {
            if let Err(err) = Self::validate_url(default_backend, "default_backend") {
                errors.push(err);
            }
        }

        for (field, value) in [
            ("failure_threshold", config.failure_threshold as u64),
            ("failover_max_retries", config.failover_max_retries as u64),
            ("backend_max_retries", config.backend_max_retries as u64),
            ("cache_max_entries", config.cache_max_entries as u64),
            ("max_body_bytes", config.max_body_bytes),
        ] {
            if value == 0 {
                errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
        }

        if let Err(err) = Self::validate_tls(config) {
            errors.push(err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_url(url: &Url, field: &str) -> ValidationResult<()> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ValidationError::InvalidUrl {
                field: field.to_string(),
                url: url.to_string(),
                reason: "URL must use http:// or https:// scheme".to_string(),
            });
        }
        if url.host().is_none() {
            return Err(ValidationError::InvalidUrl {
                field: field.to_string(),
                url: url.to_string(),
                reason: "URL must have a valid host".to_string(),
            });
        }
        Ok(())
    }

    fn validate_tls(config: &GatewayConfig) -> ValidationResult<()> {
        match (&config.tls_cert_path, &config.tls_key_path) {
            (None, None) => Ok(()),
            (Some(cert_path), Some(key_path)) => {
                if !Path::new(cert_path).exists() {
                    return Err(ValidationError::InvalidTls {
                        message: format!("Certificate file not found: {}", cert_path.display()),
                    });
                }
                if !Path::new(key_path).exists() {
                    return Err(ValidationError::InvalidTls {
                        message: format!("Private key file not found: {}", key_path.display()),
                    });
                }
                Ok(())
            }
            _ => Err(ValidationError::InvalidTls {
                message: "TLS requires both tls_cert_path and tls_key_path".to_string(),
            }),
        }
    }

    fn is_valid_domain(domain: &str) -> bool {
        domain.len() <= 253 && DOMAIN_RE.is_match(domain)
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        let mut message = format!("Found {} validation error(s):\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> GatewayConfig {
        GatewayConfig {
            server_domain: "example.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(ConfigValidator::validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_server_domain() {
        let config = GatewayConfig::default();
        let result = ConfigValidator::validate(&config);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Missing required field: server_domain")
        );
    }

    #[test]
    fn test_invalid_server_domain() {
        let mut config = valid_config();
        config.server_domain = ".example.com".to_string();
        assert!(ConfigValidator::validate(&config).is_err());

        config.server_domain = "example..com".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_zero_thresholds_rejected() {
        let mut config = valid_config();
        config.failure_threshold = 0;
        let result = ConfigValidator::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("failure_threshold"));
    }

    #[test]
    fn test_tls_requires_both_paths() {
        let mut config = valid_config();
        config.tls_cert_path = Some("/tmp/cert.pem".into());
        let result = ConfigValidator::validate(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("TLS"));
    }

    #[test]
    fn test_domain_validation() {
        assert!(ConfigValidator::is_valid_domain("example.com"));
        assert!(ConfigValidator::is_valid_domain("sub.example.co.uk"));
        assert!(!ConfigValidator::is_valid_domain("localhost"));
        assert!(!ConfigValidator::is_valid_domain(""));
        assert!(!ConfigValidator::is_valid_domain("-bad.example.com"));
    }
}
