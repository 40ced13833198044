//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::env::apply_overrides;
use crate::config::schema::LogHubConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Validation(_) => None,
        }
    }
}

/// Parse TOML text without touching the environment.
pub fn parse_config(content: &str) -> Result<LogHubConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}

/// Load a config file (or defaults), apply `LOGHUB_*` overrides, validate.
pub fn load_config(path: Option<&Path>) -> Result<LogHubConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            parse_config(&content)?
        }
        None => LogHubConfig::default(),
    };
    finish(config, |name| std::env::var(name).ok())
}

/// Apply overrides from `lookup` and validate.
pub fn finish<F>(mut config: LogHubConfig, lookup: F) -> Result<LogHubConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = apply_overrides(&mut config, lookup);
    if let Err(more) = validate_config(&config) {
        errors.extend(more);
    }
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogFormat;

    #[test]
    fn minimal_file_uses_defaults() {
        let config = parse_config("[hub]\nbuffer_size = 10\n").unwrap();
        assert_eq!(config.hub.buffer_size, 10);
        assert_eq!(config.hub.viewer_queue, 4096);
        assert_eq!(config.election.base_port, 17361);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn full_file_parses() {
        let config = parse_config(
            r#"
            token = "abc"

            [election]
            host = "0.0.0.0"
            dir = "/var/run/loghub"

            [observability]
            log_format = "json"
            prometheus = false
            "#,
        )
        .unwrap();
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert_eq!(config.election.host, "0.0.0.0");
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert!(!config.observability.prometheus);
    }

    #[test]
    fn env_and_validation_errors_are_combined() {
        let mut config = LogHubConfig::default();
        config.hub.viewer_queue = 0;
        let err = finish(config, |name| (name == "LOGHUB_QUEUE_SIZE").then(|| "x".to_string())).unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loghub.toml");
        std::fs::write(&path, "[heartbeat]\nmissed_limit = 5\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.heartbeat.missed_limit, 5);

        assert!(matches!(
            load_config(Some(&dir.path().join("missing.toml"))),
            Err(ConfigError::Io(_))
        ));
    }
}
