//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every namespace file has exactly one owner
//! - Validate value ranges (intervals > 0, backoff bounds)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AgentConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use crate::config::schema::AgentConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyHost,
    InvalidHost(String),
    EmptyCluster,
    NoApps,
    EmptyAppId { index: usize },
    EmptyPath { app_id: String },
    NoNamespaces { app_id: String },
    EmptyNamespace { app_id: String },
    DuplicateNamespace { app_id: String, namespace: String },
    SharedNamespaceFile { directory: PathBuf, namespace: String },
    ZeroValue(&'static str),
    BackoffBounds { base_ms: u64, max_ms: u64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyHost => write!(f, "host must not be empty"),
            ValidationError::InvalidHost(host) => {
                write!(f, "host '{}' must start with http:// or https://", host)
            }
            ValidationError::EmptyCluster => write!(f, "cluster must not be empty"),
            ValidationError::NoApps => write!(f, "at least one app is required"),
            ValidationError::EmptyAppId { index } => {
                write!(f, "apps[{}] has an empty app_id", index)
            }
            ValidationError::EmptyPath { app_id } => {
                write!(f, "app '{}' has an empty path", app_id)
            }
            ValidationError::NoNamespaces { app_id } => {
                write!(f, "app '{}' lists no namespaces", app_id)
            }
            ValidationError::EmptyNamespace { app_id } => {
                write!(f, "app '{}' lists an empty namespace name", app_id)
            }
            ValidationError::DuplicateNamespace { app_id, namespace } => {
                write!(f, "app '{}' lists namespace '{}' twice", app_id, namespace)
            }
            ValidationError::SharedNamespaceFile { directory, namespace } => write!(
                f,
                "namespace '{}' in {} is claimed by more than one app",
                namespace,
                directory.display()
            ),
            ValidationError::ZeroValue(field) => write!(f, "{} must be greater than zero", field),
            ValidationError::BackoffBounds { base_ms, max_ms } => write!(
                f,
                "retries.max_delay_ms ({}) is below retries.base_delay_ms ({})",
                max_ms, base_ms
            ),
        }
    }
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let host = config.host.trim();
    if host.is_empty() {
        errors.push(ValidationError::EmptyHost);
    } else if !(host.starts_with("http://") || host.starts_with("https://")) {
        errors.push(ValidationError::InvalidHost(config.host.clone()));
    }

    if config.cluster.trim().is_empty() {
        errors.push(ValidationError::EmptyCluster);
    }

    if config.apps.is_empty() {
        errors.push(ValidationError::NoApps);
    }

    let mut files = HashSet::new();
    for (index, app) in config.apps.iter().enumerate() {
        if app.app_id.trim().is_empty() {
            errors.push(ValidationError::EmptyAppId { index });
        }
        if app.path.as_os_str().is_empty() {
            errors.push(ValidationError::EmptyPath { app_id: app.app_id.clone() });
        }
        if app.namespaces.is_empty() {
            errors.push(ValidationError::NoNamespaces { app_id: app.app_id.clone() });
        }

        let mut seen = HashSet::new();
        for namespace in &app.namespaces {
            if namespace.trim().is_empty() {
                errors.push(ValidationError::EmptyNamespace { app_id: app.app_id.clone() });
                continue;
            }
            if !seen.insert(namespace.as_str()) {
                errors.push(ValidationError::DuplicateNamespace {
                    app_id: app.app_id.clone(),
                    namespace: namespace.clone(),
                });
                continue;
            }
            // Two apps in one directory would write the same namespace file.
            if !files.insert((app.directory(), namespace.clone())) {
                errors.push(ValidationError::SharedNamespaceFile {
                    directory: app.directory(),
                    namespace: namespace.clone(),
                });
            }
        }
    }

    if config.polling.interval_secs == 0 {
        errors.push(ValidationError::ZeroValue("polling.interval_secs"));
    }
    if config.polling.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("polling.request_timeout_secs"));
    }
    if config.long_polling.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("long_polling.request_timeout_secs"));
    }
    if config.long_polling.fetch_timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("long_polling.fetch_timeout_secs"));
    }
    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(ValidationError::BackoffBounds {
            base_ms: config.retries.base_delay_ms,
            max_ms: config.retries.max_delay_ms,
        });
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
    use crate::config::schema::AppConfig;

    fn valid() -> AgentConfig {
        AgentConfig {
            host: "http://apollo:8080".into(),
            apps: vec![AppConfig {
                path: PathBuf::from("/srv/shop/.env"),
                app_id: "shop".into(),
                namespaces: vec!["application".into(), "db".into()],
            }],
            ..AgentConfig::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid();
        config.host = "apollo:8080".into();
        config.polling.interval_secs = 0;
        config.apps[0].namespaces.push("db".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::InvalidHost("apollo:8080".into())));
        assert!(errors.contains(&ValidationError::ZeroValue("polling.interval_secs")));
        assert!(errors.contains(&ValidationError::DuplicateNamespace {
            app_id: "shop".into(),
            namespace: "db".into(),
        }));
    }

    #[test]
    fn test_rejects_shared_namespace_file() {
        let mut config = valid();
        config.apps.push(AppConfig {
            path: PathBuf::from("/srv/shop/.env.worker"),
            app_id: "shop-worker".into(),
            namespaces: vec!["db".into()],
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::SharedNamespaceFile {
                directory: PathBuf::from("/srv/shop"),
                namespace: "db".into(),
            }]
        );
    }

    #[test]
    fn test_empty_config_errors() {
        let errors = validate_config(&AgentConfig::default()).unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyHost));
        assert!(errors.contains(&ValidationError::NoApps));
    }
}
