//! Configuration schema for Stratum
//!
//! Configuration is stored at `~/.config/stratum/config.toml`, with
//! optional project-local overrides in `.stratum.toml`.

use crate::classify::{ClassifierRules, VolatilityClass};
use crate::plan::{EntrypointSpec, LayerPolicy};
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Tree scanning and classification settings
    pub scan: ScanConfig,

    /// Layer partitioning policy
    pub layout: LayoutConfig,

    /// Base image and entrypoint settings
    pub image: ImageConfig,

    /// Assembly backend settings
    pub assembly: AssemblyConfig,

    /// Cache settings
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// What to do with files no classification rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnmatchedPolicy {
    /// Treat as application code (the most volatile class)
    ApplicationCode,
    /// Treat as a static resource
    Resource,
    /// Fail the scan
    Reject,
}

impl UnmatchedPolicy {
    /// The default class this policy assigns, if any
    pub fn default_class(&self) -> Option<VolatilityClass> {
        match self {
            Self::ApplicationCode => Some(VolatilityClass::ApplicationCode),
            Self::Resource => Some(VolatilityClass::Resource),
            Self::Reject => None,
        }
    }
}

/// Tree scanning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Top-level directories holding dependency archives
    pub dependency_dirs: Vec<String>,

    /// Top-level directories holding static resources
    pub resource_dirs: Vec<String>,

    /// Top-level directories holding compiled application code
    pub application_dirs: Vec<String>,

    /// Version substrings marking an unstable dependency
    pub snapshot_markers: Vec<String>,

    /// Policy for unmatched paths
    pub unmatched: UnmatchedPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let rules = ClassifierRules::default();
        Self {
            dependency_dirs: rules.dependency_dirs,
            resource_dirs: rules.resource_dirs,
            application_dirs: rules.application_dirs,
            snapshot_markers: rules.snapshot_markers,
            unmatched: UnmatchedPolicy::ApplicationCode,
        }
    }
}

impl ScanConfig {
    /// Build classifier rules from this configuration
    pub fn rules(&self) -> ClassifierRules {
        ClassifierRules {
            dependency_dirs: self.dependency_dirs.clone(),
            resource_dirs: self.resource_dirs.clone(),
            application_dirs: self.application_dirs.clone(),
            snapshot_markers: self.snapshot_markers.clone(),
            default_class: self.unmatched.default_class(),
        }
    }
}

/// Layer partitioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Maximum number of layers
    pub max_layers: usize,

    /// Maximum bytes per layer (unlimited when absent)
    pub max_layer_bytes: Option<u64>,

    /// Volatility classes in layer order
    pub volatility_order: Vec<VolatilityClass>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let policy = LayerPolicy::default();
        Self {
            max_layers: policy.max_layers,
            max_layer_bytes: policy.max_layer_bytes,
            volatility_order: policy.volatility_order,
        }
    }
}

impl LayoutConfig {
    /// Build a layer policy from this configuration
    pub fn policy(&self) -> LayerPolicy {
        LayerPolicy {
            max_layers: self.max_layers,
            max_layer_bytes: self.max_layer_bytes,
            volatility_order: self.volatility_order.clone(),
        }
    }
}

/// Base image and entrypoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Base image reference the layers are applied onto
    pub base: String,

    /// Entrypoint settings
    pub entrypoint: EntrypointConfig,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base: "docker.io/library/eclipse-temurin:21-jre".to_string(),
            entrypoint: EntrypointConfig::default(),
        }
    }
}

/// Entrypoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntrypointConfig {
    /// Tree-relative path of the executable
    pub executable: String,

    /// Argument template; `{}` marks a runtime-argument slot
    pub args: Vec<String>,

    /// Environment variable consulted for extra options at run time
    pub options_env: Option<String>,
}

impl Default for EntrypointConfig {
    fn default() -> Self {
        Self {
            executable: String::new(),
            args: vec!["{}".to_string()],
            options_env: Some("JAVA_TOOL_OPTIONS".to_string()),
        }
    }
}

impl EntrypointConfig {
    /// Build an entrypoint spec from this configuration
    pub fn spec(&self) -> EntrypointSpec {
        EntrypointSpec {
            executable: self.executable.clone(),
            args: self.args.clone(),
            options_env: self.options_env.clone(),
        }
    }
}

/// Assembly backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Backend name
    pub backend: String,

    /// Build tool the dockerfile backend invokes
    pub build_command: String,

    /// Explicit image tag; content-addressed when absent
    pub tag: Option<String>,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            backend: "dockerfile".to_string(),
            build_command: "podman".to_string(),
            tag: None,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable layer artifact caching (default: true)
    pub enabled: bool,

    /// Auto-remove cached layers older than N days during gc (0 = disabled)
    pub gc_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gc_days: 30,
        }
    }
}
