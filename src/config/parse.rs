use super::types::*;
use crate::config::{env_var_regex, expand_env_vars, expand_tilde};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string)
}

/// Parse and validate a YAML config document.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(yaml);

    check_unexpanded_vars(&yaml_string)?;

    // An empty document means "all defaults"
    let mut config: Config = if yaml_string.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&yaml_string)?
    };

    config.agent.docker_socket = expand_tilde(&config.agent.docker_socket);

    validate_config(&config)?;

    Ok(config)
}

/// Load the config at `path`, or fall back to defaults when there is none.
pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(Config::default()),
    }
}

fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let mut unexpanded_vars: Vec<String> = env_var_regex()
        .captures_iter(yaml_string)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}",
        unexpanded_vars.join(", ")
    )))
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.agent.queue_capacity == 0 {
        errors.push("agent.queue_capacity must be greater than 0".to_string());
    }

    if let Some(hostname) = &config.agent.hostname {
        if hostname.trim().is_empty() {
            errors.push("agent.hostname must not be empty when set".to_string());
        }
    }

    if config.server.queue_capacity == 0 {
        errors.push("server.queue_capacity must be greater than 0".to_string());
    }

    if let Err(e) = reqwest::Url::parse(&config.backend.url) {
        errors.push(format!("backend.url '{}' is invalid: {}", config.backend.url, e));
    }

    if config.backend.supervise && config.backend.command.trim().is_empty() {
        errors.push("backend.command is required when backend.supervise is true".to_string());
    }

    if config.storage.max_attempts == 0 {
        errors.push("storage.max_attempts must be at least 1".to_string());
    }

    if config.maintenance.interval.is_zero() {
        errors.push("maintenance.interval must be greater than 0".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
