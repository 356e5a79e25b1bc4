//! Backend factory
//!
//! Resolves a backend name from configuration to a boxed implementation.

use crate::assemble::dockerfile::DockerfileBackend;
use crate::assemble::ImageBackend;
use crate::config::Config;
use crate::error::{StratumError, StratumResult};

/// Backend names this build knows about
pub const KNOWN_BACKENDS: &[&str] = &["dockerfile"];

/// Create the configured assembly backend
pub fn create_backend(config: &Config) -> StratumResult<Box<dyn ImageBackend>> {
    match config.assembly.backend.as_str() {
        "dockerfile" => Ok(Box::new(DockerfileBackend::from_config(config))),
        other => Err(StratumError::BackendUnknown {
            name: other.to_string(),
            known: KNOWN_BACKENDS.join(", "),
        }),
    }
}
