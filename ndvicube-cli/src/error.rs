//! CLI error type.

use std::fmt;

use ndvicube::aoi::AoiError;
use ndvicube::config::ConfigError;
use ndvicube::dekad::DateError;
use ndvicube::logging::LoggingError;
use ndvicube::provider::ProviderError;
use ndvicube::PipelineError;

/// Errors reported to the user by the CLI.
#[derive(Debug)]
pub enum CliError {
    /// Missing or inconsistent settings.
    Config(String),
    ConfigFile(ConfigError),
    Logging(LoggingError),
    Aoi(AoiError),
    Date(DateError),
    Provider(ProviderError),
    Pipeline(PipelineError),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_)
            | CliError::ConfigFile(_)
            | CliError::Aoi(_)
            | CliError::Date(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "Configuration file error: {}", e),
            CliError::Logging(e) => write!(f, "Logging setup failed: {}", e),
            CliError::Aoi(e) => write!(f, "Area of interest error: {}", e),
            CliError::Date(e) => write!(f, "Date error: {}", e),
            CliError::Provider(e) => write!(f, "Provider error: {}", e),
            CliError::Pipeline(e) => write!(f, "Pipeline failed: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(_) => None,
            CliError::ConfigFile(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::Aoi(e) => Some(e),
            CliError::Date(e) => Some(e),
            CliError::Provider(e) => Some(e),
            CliError::Pipeline(e) => Some(e),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<AoiError> for CliError {
    fn from(e: AoiError) -> Self {
        CliError::Aoi(e)
    }
}

impl From<DateError> for CliError {
    fn from(e: DateError) -> Self {
        CliError::Date(e)
    }
}

impl From<ProviderError> for CliError {
    fn from(e: ProviderError) -> Self {
        CliError::Provider(e)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        CliError::Pipeline(e)
    }
}
