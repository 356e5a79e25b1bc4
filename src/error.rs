//! Error types for Stratum
//!
//! All modules use `StratumResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Stratum operations
pub type StratumResult<T> = Result<T, StratumError>;

/// All errors that can occur in Stratum
#[derive(Error, Debug)]
pub enum StratumError {
    // Classification errors
    #[error("No classification rule matches '{path}' and unmatched files are rejected")]
    Unclassifiable { path: String },

    // Planning errors
    #[error("Layering policy cannot be satisfied: {reason}")]
    PolicyViolation { reason: String },

    #[error("Invalid build plan: {reason}")]
    InvalidPlan { reason: String },

    // Assembly errors
    #[error("Backend '{backend}' failed to assemble the plan: {reason}")]
    AssemblyFailed { backend: String, reason: String },

    #[error("Assembly cancelled before layer {order_index}")]
    AssemblyCancelled { order_index: usize },

    #[error("Unknown assembly backend: {name}. Known backends: {known}")]
    BackendUnknown { name: String, known: String },

    #[error("Assembly backend '{name}' is not available on this system")]
    BackendUnavailable { name: String },

    // Cache errors
    #[error("Failed to read cache records {path}: {reason}")]
    CacheRecordsRead { path: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Invalid path: {path}: {reason}")]
    PathInvalid { path: PathBuf, reason: String },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl StratumError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a policy violation error
    pub fn policy(reason: impl Into<String>) -> Self {
        Self::PolicyViolation {
            reason: reason.into(),
        }
    }

    /// Create an invalid plan error
    pub fn invalid_plan(reason: impl Into<String>) -> Self {
        Self::InvalidPlan {
            reason: reason.into(),
        }
    }

    /// Check if error is retryable.
    ///
    /// Stratum never retries internally; retry decisions belong to the
    /// caller, operating on the content-addressed artifact cache.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AssemblyFailed { .. }
                | Self::AssemblyCancelled { .. }
                | Self::BackendUnavailable { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Unclassifiable { .. } => Some(
                "Set scan.unmatched = \"application-code\" or add the path to scan.resource_dirs",
            ),
            Self::PolicyViolation { .. } => {
                Some("Raise layout.max_layers or relax layout.max_layer_bytes")
            }
            Self::BackendUnavailable { .. } => {
                Some("Install podman, or point assembly.build_command at your build tool")
            }
            Self::AssemblyCancelled { .. } => {
                Some("Re-run assemble; finished layers are cached and will be reused")
            }
            _ => None,
        }
    }
}
