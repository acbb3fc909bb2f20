//! Error taxonomy for the provisioning pipeline.

use thiserror::Error;

/// Error type for provisioning operations.
///
/// Any error aborts the pipeline immediately; there is no local recovery and
/// no rollback of already-applied host changes. The operator's recovery path
/// is to fix the reported cause and re-run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Permission error: {0}")]
    Permission(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Version resolution error: {0}")]
    VersionResolution(String),

    #[error("Installation error: {0}")]
    Installation(String),

    #[error("External tool error: {0}")]
    ExternalTool(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// Short classification tag used in diagnostic output.
    pub fn classification(&self) -> &'static str {
        match self {
            ProvisionError::Permission(_) => "permission",
            ProvisionError::Resource(_) => "resource",
            ProvisionError::Configuration(_) => "configuration",
            ProvisionError::UnsupportedPlatform(_) => "unsupported-platform",
            ProvisionError::VersionResolution(_) => "version-resolution",
            ProvisionError::Installation(_) => "installation",
            ProvisionError::ExternalTool(_) => "external-tool",
            ProvisionError::Http(_) => "http",
            ProvisionError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
