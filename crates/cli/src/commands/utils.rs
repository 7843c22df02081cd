use rotor_core::{
    config::RotorConfig,
    upstream::{BuilderError, RotationError},
};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Invalid input: {0}")]
    Input(String),
    #[error("Request failed: {0}")]
    Rpc(#[from] RotationError),
    #[error("Error: {0}")]
    General(String),
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::General(error.to_string())
    }
}

impl From<BuilderError> for CliError {
    fn from(error: BuilderError) -> Self {
        Self::Config(error.to_string())
    }
}

pub type CliResult<T> = Result<T, CliError>;

/// Loads the router configuration from `file`, or from `ROTOR_CONFIG` when unset.
pub fn load_config(file: Option<&str>) -> CliResult<RotorConfig> {
    let config = match file {
        Some(path) => {
            if !Path::new(path).exists() {
                return Err(CliError::Config(format!("File not found: {path}")));
            }
            RotorConfig::from_file(path)
        }
        None => RotorConfig::load(),
    };
    config.map_err(|e| CliError::Config(e.to_string()))
}

pub fn print_success(message: &str) {
    println!("[SUCCESS] {message}");
}

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {message}");
}

pub fn print_info(message: &str) {
    eprintln!("[INFO] {message}");
}
