//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
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

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::EventConfig;

    const SAMPLE: &str = r#"
[gateway]
port = 4000
cors = true

[environment]
LOG_LEVEL = "debug"

[[functions]]
name = "users"
handler = "handlers/users.get"
timeout_secs = 3
[functions.environment]
TABLE = "users"
[[functions.events]]
http = { method = "GET", path = "/users/{id}", cors = true }
[[functions.events]]
websocket = { route_key = "$connect" }
"#;

    #[test]
    fn parses_full_sample() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.gateway.port, 4000);
        assert!(config.gateway.cors);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.environment["LOG_LEVEL"], "debug");

        let users = &config.functions[0];
        assert_eq!(users.timeout_secs, 3);
        assert_eq!(users.memory_mb, 1024);
        assert_eq!(users.environment["TABLE"], "users");
        assert!(matches!(&users.events[0], EventConfig::Http(h) if h.cors && h.path == "/users/{id}"));
        assert!(matches!(&users.events[1], EventConfig::WebSocket(w) if w.route_key == "$connect"));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.gateway.port, 3000);
        assert!(config.functions.is_empty());
    }

    #[test]
    fn syntax_and_semantic_errors_are_distinct() {
        assert!(matches!(parse_config("[gateway"), Err(ConfigError::Parse(_))));

        let invalid = r#"
[[functions]]
name = "f"
handler = "f.handler"
timeout_secs = 0
"#;
        let err = parse_config(invalid).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
