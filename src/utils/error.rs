use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Dependency manifest not found at {}", path.display())]
    ManifestMissing { path: PathBuf },

    #[error("Dependency manifest line {line}: {message}")]
    ManifestError { line: usize, message: String },

    #[error("Dependency installation failed: {message}")]
    InstallError { message: String },

    #[error("Staging failed for {}: {message}", path.display())]
    StagingError { path: PathBuf, message: String },

    #[error("Could not resolve application \"{app_ref}\": {reason}")]
    ResolutionError { app_ref: String, reason: String },

    #[error("Could not bind {addr}: {source}")]
    BindError {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {message}")]
    ServerError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Assembly,
    Launch,
    Network,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl ServiceError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn install(message: impl Into<String>) -> Self {
        Self::InstallError {
            message: message.into(),
        }
    }

    pub fn staging(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StagingError {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn resolution(app_ref: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResolutionError {
            app_ref: app_ref.into(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
            Self::ManifestMissing { .. }
            | Self::ManifestError { .. }
            | Self::InstallError { .. }
            | Self::StagingError { .. } => ErrorCategory::Assembly,
            Self::ResolutionError { .. } | Self::BindError { .. } | Self::ServerError { .. } => {
                ErrorCategory::Launch
            }
            Self::HttpError(_) => ErrorCategory::Network,
            Self::IoError(_) | Self::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration => ErrorSeverity::Medium,
            ErrorCategory::Assembly | ErrorCategory::Network | ErrorCategory::System => {
                ErrorSeverity::High
            }
            ErrorCategory::Launch => ErrorSeverity::Critical,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.severity().exit_code()
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::ManifestMissing { .. } => {
                "Make sure the build plan copies the dependency manifest before installing"
            }
            Self::ManifestError { .. } => {
                "Fix the manifest line: one `name<constraint>` entry per line"
            }
            Self::InstallError { .. } => {
                "Check the declared version constraints and network access, then rebuild"
            }
            Self::StagingError { .. } => "Check that the source files exist and are readable",
            Self::ResolutionError { .. } => {
                "Use the `<module>:<attribute>` form and check the application is registered"
            }
            Self::BindError { .. } => {
                "Stop the process holding the address or choose another port explicitly"
            }
            Self::HttpError(_) => "Check that the target service is reachable",
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => "Review the configuration values",
            Self::IoError(_) | Self::SerializationError(_) | Self::ServerError { .. } => {
                "Check the logs for details"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Assembly => format!("Image assembly failed: {}", self),
            ErrorCategory::Launch => format!("Startup failed: {}", self),
            ErrorCategory::Network => format!("Network failure: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
