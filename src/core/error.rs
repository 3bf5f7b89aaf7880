//! Error types for config loading and normalization

use thiserror::Error;

/// Errors raised while turning a raw config document into a normalized config.
///
/// All validation happens eagerly; one invalid field fails the whole run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unrecognized config document: {0}")]
    UnknownShape(String),

    #[error("Invalid timestamp for '{field}': '{value}' ({reason})")]
    InvalidTimestamp {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid date range for machine '{machine}': {start} is not before {end}")]
    InvalidDateRange {
        machine: String,
        start: String,
        end: String,
    },

    #[error("Invalid resource quantity at '{path}': {value}")]
    InvalidResourceFormat { path: String, value: String },

    #[error("Invalid owner references: {0}")]
    InvalidOwnerReference(String),

    #[error("Invalid log level '{0}', expected one of DEBUG, INFO, WARN, WARNING, ERROR, CRITICAL")]
    InvalidLogLevel(String),

    #[error("max_instances must be a positive integer, got {0}")]
    InvalidMaxClients(String),

    #[error("Machine name '{0}' is not a valid DNS label after normalization")]
    InvalidMachineName(String),

    #[error("Project name '{0}' is not a valid DNS label")]
    InvalidProjectName(String),

    #[error("Duplicate machine name: {0}")]
    DuplicateMachine(String),

    #[error("Machine name '{0}' is reserved: its tasks would clash with a shared workflow task")]
    ReservedMachineName(String),

    #[error("Invalid tag for machine '{machine}': {value} (expected name or {{name, asset}})")]
    InvalidTag { machine: String, value: String },

    #[error("Machine '{machine}' is missing required field '{field}'")]
    MissingField { machine: String, field: String },
}

impl ConfigError {
    pub(crate) fn missing(machine: &str, field: &str) -> Self {
        ConfigError::MissingField {
            machine: machine.to_string(),
            field: field.to_string(),
        }
    }
}
